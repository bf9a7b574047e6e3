use crate::{
    JobStatus, Liveness, SliceLock, SyncJob, UserStore, clear_lease, lease_alive, write_lease,
};

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    AlreadyRunning,
    Started,
    Resumed,
}

impl StartOutcome {
    pub(crate) fn message(self) -> &'static str {
        match self {
            StartOutcome::AlreadyRunning => "Sync already running",
            StartOutcome::Started => "Wallet sync started",
            StartOutcome::Resumed => "Resuming wallet sync",
        }
    }
}

/// Decide how a `start` request affects the job, under the same exclusive
/// lock that guards slices. The lease check, job rewrite, worker spawn, and
/// lease write all happen inside one lock scope, so a racing `start` either
/// waits out the lock or observes the new worker's lease; two starts can
/// never both decide to spawn. If a slice is mid-flight the caller simply
/// hears "already running".
pub(crate) fn prepare_start(
    store: &UserStore,
    stake_or_address: &str,
    force: bool,
    liveness: &dyn Liveness,
    spawn: impl FnOnce() -> Result<u32, Box<dyn std::error::Error>>,
) -> Result<StartOutcome, Box<dyn std::error::Error>> {
    if stake_or_address.trim().is_empty() {
        return Err("Missing stake or address for wallet sync.".into());
    }

    let Some(_lock) = SliceLock::try_acquire(&store.lock_path())? else {
        return Ok(StartOutcome::AlreadyRunning);
    };

    let existing = store.load_job();
    let resumable = !force
        && existing
            .as_ref()
            .map(|job| job.status == JobStatus::Running && !job.done)
            .unwrap_or(false);

    let outcome = if resumable {
        if lease_alive(&store.lease_path(), liveness) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        // The job claims to be running but its worker is gone: keep the
        // cursor and hand the job to a fresh worker.
        clear_lease(&store.lease_path());
        let mut job = existing.unwrap_or_else(|| SyncJob::new(stake_or_address));
        job.touch(format!("Resuming scan at page {}...", job.page));
        store.save_job(&job)?;
        StartOutcome::Resumed
    } else {
        clear_lease(&store.lease_path());
        store.save_job(&SyncJob::new(stake_or_address))?;
        StartOutcome::Started
    };

    // Readers of the index expect the file to exist once a sync has been
    // requested, even before the first enrichment lands.
    if !store.index_exists() || force {
        store.save_index(&[])?;
    }

    // Record the spawned worker before releasing the lock. The worker
    // re-registers the same id when its loop begins.
    let pid = spawn()?;
    write_lease(&store.lease_path(), pid)?;

    Ok(outcome)
}

/// Read-only snapshot; a missing job file reads as an idle, finished job.
pub(crate) fn sync_status(store: &UserStore) -> SyncJob {
    store.load_job().unwrap_or_else(SyncJob::idle)
}

/// Terminal Configuration failure: surface a readable message through
/// `status()` and stop the job until an explicit restart.
pub(crate) fn fail_job(store: &UserStore, message: &str) -> Result<SyncJob, Box<dyn std::error::Error>> {
    let mut job = store.load_job().unwrap_or_else(|| SyncJob::new(""));
    job.finish(JobStatus::Error, message);
    store.save_job(&job)?;
    Ok(job)
}
