use std::process::{Command, Stdio};
use std::time::Duration;

use crate::{
    AssetProvider, BlockfrostProvider, LeaseGuard, ProcessLiveness, SliceOptions, SliceOutcome,
    StartResponse, SyncJob, UserStore, append_sync_log, env_u64, env_usize, fail_job,
    prepare_start, run_slice, sync_status,
};
use crate::slice::{DEFAULT_BUDGET_SECS, DEFAULT_MAX_ENRICH};

pub(crate) const WORKER_MAX_TICKS: u64 = 2000;
pub(crate) const WORKER_TICK_SECS: u64 = 2;

pub(crate) fn slice_options_from_env() -> Result<SliceOptions, Box<dyn std::error::Error>> {
    Ok(SliceOptions {
        budget: Duration::from_secs(env_u64("WALLETSYNC_SLICE_BUDGET_SECS", DEFAULT_BUDGET_SECS)?),
        max_enrich: env_usize("WALLETSYNC_ENRICH_CEILING", DEFAULT_MAX_ENRICH)?,
    })
}

/// Handle a `start` request: atomically decide fresh-start / resume /
/// already-running. The worker spawn runs inside `prepare_start`'s lock
/// scope so its pid lands on the lease before any racing `start` can look.
pub(crate) fn start_sync(
    store: &UserStore,
    stake_or_address: &str,
    force: bool,
) -> Result<StartResponse, Box<dyn std::error::Error>> {
    let outcome = prepare_start(store, stake_or_address, force, &ProcessLiveness, || {
        spawn_worker(store)
    })?;
    append_sync_log(
        store.data_dir(),
        &format!("start user={}: {}", store.user(), outcome.message()),
    );
    Ok(StartResponse {
        status: "success".to_string(),
        message: outcome.message().to_string(),
    })
}

/// Re-exec this binary as a detached `worker` with null stdio in its own
/// process group, so it outlives the request that started it. Returns the
/// child pid for the lease.
fn spawn_worker(store: &UserStore) -> Result<u32, Box<dyn std::error::Error>> {
    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    cmd.arg("worker")
        .arg("--user")
        .arg(store.user())
        .arg("--data-dir")
        .arg(store.data_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let child = cmd.spawn()?;
    eprintln!("[worker] spawned pid {} for user {}", child.id(), store.user());
    Ok(child.id())
}

/// Worker entry point: resolve the provider from configuration, register the
/// lease, then run slices until the job finishes. A missing credential is a
/// terminal Configuration failure written to the job, not a crash.
pub(crate) fn run_worker_loop(store: &UserStore) -> Result<(), Box<dyn std::error::Error>> {
    let provider = match BlockfrostProvider::from_config(store.data_dir()) {
        Ok(provider) => provider,
        Err(err) => {
            append_sync_log(store.data_dir(), &format!("worker abort: {err}"));
            fail_job(store, &err.to_string())?;
            return Ok(());
        }
    };
    let opts = slice_options_from_env()?;
    let max_ticks = env_u64("WALLETSYNC_WORKER_MAX_TICKS", WORKER_MAX_TICKS)?;
    let tick_sleep = Duration::from_secs(env_u64("WALLETSYNC_WORKER_TICK_SECS", WORKER_TICK_SECS)?);
    drive_worker(store, &provider, &opts, max_ticks, tick_sleep)
}

/// The loop body behind `run_worker_loop`, with every collaborator injected.
/// The tick cap bounds a stuck provider; a healthy run exits on its own when
/// the slice reports a terminal outcome.
pub(crate) fn drive_worker(
    store: &UserStore,
    provider: &dyn AssetProvider,
    opts: &SliceOptions,
    max_ticks: u64,
    tick_sleep: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let _lease = LeaseGuard::register(&store.lease_path())?;
    append_sync_log(
        store.data_dir(),
        &format!("worker {} leased user={}", std::process::id(), store.user()),
    );

    for tick in 0..max_ticks {
        match run_slice(store, provider, opts)? {
            SliceOutcome::Idle => break,
            SliceOutcome::Complete => {
                append_sync_log(store.data_dir(), "worker: sync complete");
                break;
            }
            SliceOutcome::Faulted => {
                append_sync_log(store.data_dir(), "worker: job faulted");
                break;
            }
            // Someone else holds the slice lock or the provider hiccuped;
            // sleep and try again.
            SliceOutcome::Locked | SliceOutcome::Retry => {}
            SliceOutcome::Progress { enriched, remaining, .. } => {
                eprintln!("[worker] tick {tick}: {enriched} enriched, {remaining} remaining");
            }
        }
        std::thread::sleep(tick_sleep);
    }

    append_sync_log(store.data_dir(), "worker exit");
    Ok(())
}

/// One synchronous slice on behalf of a `tick` request, returning the job
/// snapshot after the slice ran.
pub(crate) fn sync_tick(store: &UserStore) -> Result<SyncJob, Box<dyn std::error::Error>> {
    let snapshot = sync_status(store);
    if snapshot.done {
        return Ok(snapshot);
    }
    let provider = match BlockfrostProvider::from_config(store.data_dir()) {
        Ok(provider) => provider,
        Err(err) => return fail_job(store, &err.to_string()),
    };
    let opts = slice_options_from_env()?;
    run_slice(store, &provider, &opts)?;
    Ok(sync_status(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssetDetail, AssetRow, JobStatus, SyncJob};
    use serde_json::json;

    struct ScriptedProvider {
        page_one: Vec<AssetRow>,
    }

    impl AssetProvider for ScriptedProvider {
        fn address_assets(&self, _target: &str, page: u32) -> Result<Vec<AssetRow>, String> {
            if page == 1 {
                Ok(self.page_one.clone())
            } else {
                Ok(Vec::new())
            }
        }

        fn asset_detail(&self, unit: &str) -> Result<AssetDetail, String> {
            Ok(AssetDetail {
                asset_name: Some(unit.get(56..).unwrap_or_default().to_string()),
                onchain_metadata: Some(json!({"name": "Piece", "image": "ipfs://Qm"})),
                metadata: None,
            })
        }
    }

    fn temp_store(name: &str) -> UserStore {
        let dir = std::env::temp_dir()
            .join("walletsyncd_test")
            .join(format!("supervisor_{}_{name}", std::process::id()));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        UserStore::open(&dir, "tester").unwrap()
    }

    fn fast_opts() -> SliceOptions {
        SliceOptions {
            budget: Duration::from_secs(60),
            max_enrich: 20,
        }
    }

    #[test]
    fn test_worker_runs_job_to_completion_and_releases_lease() {
        let store = temp_store("completion");
        store.save_job(&SyncJob::new("stake1test")).unwrap();
        let rows: Vec<AssetRow> = (0..30)
            .map(|i| AssetRow {
                unit: format!("{}{:04x}", "a".repeat(56), i),
                quantity: "1".to_string(),
            })
            .collect();
        let provider = ScriptedProvider { page_one: rows };

        drive_worker(&store, &provider, &fast_opts(), 100, Duration::from_millis(1)).unwrap();

        let job = store.load_job().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.done);
        assert!(!store.lease_path().exists());
        assert_eq!(
            store.load_policy_cache(&"a".repeat(56)).unwrap().assets_cache.len(),
            30
        );
    }

    #[test]
    fn test_worker_with_no_job_exits_immediately() {
        let store = temp_store("nojob");
        let provider = ScriptedProvider { page_one: Vec::new() };
        drive_worker(&store, &provider, &fast_opts(), 100, Duration::from_millis(1)).unwrap();
        assert!(store.load_job().is_none());
        assert!(!store.lease_path().exists());
    }

    #[test]
    fn test_worker_respects_tick_cap() {
        let store = temp_store("cap");
        store.save_job(&SyncJob::new("stake1test")).unwrap();
        let rows: Vec<AssetRow> = (0..100)
            .map(|i| AssetRow {
                unit: format!("{}{:04x}", "b".repeat(56), i),
                quantity: "1".to_string(),
            })
            .collect();
        let provider = ScriptedProvider { page_one: rows };

        // Two ticks at 20 enrichments each cannot finish 100 assets.
        drive_worker(&store, &provider, &fast_opts(), 2, Duration::from_millis(1)).unwrap();

        let job = store.load_job().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(!job.done);
        // The lease guard still cleaned up on exit.
        assert!(!store.lease_path().exists());
    }

    #[test]
    fn test_tick_on_finished_job_returns_snapshot_untouched() {
        let store = temp_store("ticksnapshot");
        let mut job = SyncJob::new("stake1test");
        job.finish(JobStatus::Complete, "Wallet sync complete");
        store.save_job(&job).unwrap();

        let snapshot = sync_tick(&store).unwrap();
        assert_eq!(snapshot.status, JobStatus::Complete);
        assert_eq!(snapshot.message, "Wallet sync complete");
    }

    #[test]
    fn test_tick_without_credential_faults_job() {
        if crate::env_optional("BLOCKFROST_PROJECT_ID").is_some() {
            return;
        }
        let store = temp_store("tickkey");
        store.save_job(&SyncJob::new("stake1test")).unwrap();

        let snapshot = sync_tick(&store).unwrap();
        assert_eq!(snapshot.status, JobStatus::Error);
        assert!(snapshot.done);
        assert_eq!(snapshot.message, "Missing API Key");
    }
}
