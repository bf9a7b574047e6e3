use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

pub(crate) const DEFAULT_DATA_DIR: &str = "data";

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<u64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn env_usize(name: &str, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<usize>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Collapse a user handle to the characters that are safe as a directory
/// name. The store treats the result as an opaque key; there is no
/// directory-scan fallback for case variants.
pub(crate) fn sanitize_user(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub(crate) fn resolve_data_dir(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Some(value) = env_optional("WALLETSYNC_DATA_DIR") {
        return PathBuf::from(value);
    }
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Append one timestamped line to the shared sync log. Best effort: sync
/// progress must never fail because the log is unwritable.
pub(crate) fn append_sync_log(data_dir: &Path, msg: &str) {
    let path = data_dir.join("sync_debug.log");
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "[{}] {msg}", Utc::now().to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_user_strips_specials() {
        assert_eq!(sanitize_user("Fre5h.Fence!"), "Fre5hFence");
        assert_eq!(sanitize_user("../../etc"), "etc");
        assert_eq!(sanitize_user(""), "");
    }

    #[test]
    fn test_resolve_data_dir_prefers_cli() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/x")));
        assert_eq!(dir, PathBuf::from("/tmp/x"));
    }
}
