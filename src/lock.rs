use std::fs::OpenOptions;
use std::path::Path;

/// Non-blocking exclusive lock guarding one slice execution. A caller that
/// cannot acquire it treats the slice as already in flight and returns
/// without side effects. Released on drop.
pub(crate) struct SliceLock {
    #[cfg(unix)]
    _file: std::fs::File,
    #[cfg(not(unix))]
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl SliceLock {
    pub(crate) fn try_acquire(path: &Path) -> Result<Option<SliceLock>, Box<dyn std::error::Error>> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(Some(SliceLock { _file: file }));
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Ok(None);
        }
        Err(err.into())
    }
}

#[cfg(not(unix))]
impl SliceLock {
    pub(crate) fn try_acquire(path: &Path) -> Result<Option<SliceLock>, Box<dyn std::error::Error>> {
        match OpenOptions::new().create_new(true).write(true).open(path) {
            Ok(_) => Ok(Some(SliceLock {
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(not(unix))]
impl Drop for SliceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_lock_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("walletsyncd_test");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("lock_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let path = temp_lock_path("contend");
        let first = SliceLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        let second = SliceLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_released_on_drop() {
        let path = temp_lock_path("release");
        let first = SliceLock::try_acquire(&path).unwrap();
        drop(first);
        let second = SliceLock::try_acquire(&path).unwrap();
        assert!(second.is_some());
    }
}
