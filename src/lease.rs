use std::path::{Path, PathBuf};

/// Host-provided liveness probe for worker ids. The production impl asks the
/// OS whether the process still exists; tests script the answer.
pub(crate) trait Liveness {
    fn is_alive(&self, pid: u32) -> bool;
}

pub(crate) struct ProcessLiveness;

#[cfg(unix)]
impl Liveness for ProcessLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        // Signal 0 probes without delivering. EPERM still means the process
        // exists, just not ours to signal.
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
impl Liveness for ProcessLiveness {
    fn is_alive(&self, _pid: u32) -> bool {
        // No cheap probe available; report dead so a stale lease never
        // blocks a restart forever.
        false
    }
}

pub(crate) fn read_lease(path: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(path).ok()?;
    raw.trim().parse::<u32>().ok()
}

/// True when a lease file exists and its worker id passes the liveness probe.
pub(crate) fn lease_alive(path: &Path, liveness: &dyn Liveness) -> bool {
    match read_lease(path) {
        Some(pid) => liveness.is_alive(pid),
        None => false,
    }
}

pub(crate) fn write_lease(path: &Path, pid: u32) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, pid.to_string())?;
    Ok(())
}

pub(crate) fn clear_lease(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Registers the calling worker in the lease file and removes it when the
/// guard drops, so an exiting or panicking worker never blocks the next
/// `start`.
pub(crate) struct LeaseGuard {
    path: PathBuf,
}

impl LeaseGuard {
    pub(crate) fn register(path: &Path) -> Result<LeaseGuard, Box<dyn std::error::Error>> {
        write_lease(path, std::process::id())?;
        Ok(LeaseGuard {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
