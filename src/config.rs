use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::env_optional;

pub(crate) const MAINNET_BASE_URL: &str = "https://cardano-mainnet.blockfrost.io/api/v0";

#[derive(Debug, Clone, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    blockfrost_project_id: Option<String>,
}

/// Resolve the indexer credential: env var first, then the secrets file
/// candidates near the data root. An empty result is a Configuration error
/// at the call site, not here.
pub(crate) fn resolve_project_id(data_dir: &Path) -> Option<String> {
    if let Some(key) = env_optional("BLOCKFROST_PROJECT_ID") {
        return Some(key.trim().to_string());
    }
    for candidate in secrets_candidates(data_dir) {
        let Ok(raw) = std::fs::read_to_string(&candidate) else {
            continue;
        };
        if let Ok(cfg) = serde_json::from_str::<SecretsFile>(&raw) {
            if let Some(key) = cfg.blockfrost_project_id {
                let key = key.trim().to_string();
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
    }
    None
}

fn secrets_candidates(data_dir: &Path) -> Vec<PathBuf> {
    let mut out = vec![data_dir.join("secrets").join("config.json")];
    if let Some(parent) = data_dir.parent() {
        out.push(parent.join("secrets").join("config.json"));
    }
    out
}

pub(crate) fn resolve_base_url() -> String {
    env_optional("WALLETSYNC_BLOCKFROST_URL").unwrap_or_else(|| MAINNET_BASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("walletsyncd_test")
            .join(format!("config_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_secrets_file_lookup() {
        let dir = temp_dir("secrets");
        let secrets = dir.join("secrets");
        std::fs::create_dir_all(&secrets).unwrap();
        std::fs::write(
            secrets.join("config.json"),
            r#"{"blockfrost_project_id": "  mainnetKey123  "}"#,
        )
        .unwrap();
        // Only meaningful when the env var is not set in the test environment.
        if env_optional("BLOCKFROST_PROJECT_ID").is_none() {
            assert_eq!(resolve_project_id(&dir).as_deref(), Some("mainnetKey123"));
        }
    }

    #[test]
    fn test_missing_key_is_none() {
        let dir = temp_dir("missing");
        if env_optional("BLOCKFROST_PROJECT_ID").is_none() {
            assert!(resolve_project_id(&dir).is_none());
        }
    }
}
