use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{PolicyAssetCache, SyncJob, WalletIndexEntry, sanitize_user};

/// Per-user durable store: flat JSON files under `<data>/<user>/wallet/`.
/// Unreadable or corrupt entries are reported as absent so the engine can
/// reinitialize them instead of crashing.
pub(crate) struct UserStore {
    data_dir: PathBuf,
    user: String,
    wallet_dir: PathBuf,
}

impl UserStore {
    pub(crate) fn open(data_dir: &Path, user: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let safe = sanitize_user(user);
        if safe.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "User identity missing.").into());
        }
        let wallet_dir = data_dir.join(&safe).join("wallet");
        std::fs::create_dir_all(&wallet_dir)?;
        Ok(UserStore {
            data_dir: data_dir.to_path_buf(),
            user: safe,
            wallet_dir,
        })
    }

    pub(crate) fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn user(&self) -> &str {
        &self.user
    }

    // ── Key layout ──────────────────────────────────────────────────────

    pub(crate) fn job_path(&self) -> PathBuf {
        self.wallet_dir.join("wallet_sync_job.json")
    }

    pub(crate) fn lease_path(&self) -> PathBuf {
        self.wallet_dir.join("sync_worker.pid")
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.wallet_dir.join("wallet_sync.lock")
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.wallet_dir.join("wallet.json")
    }

    pub(crate) fn policy_path(&self, policy_id: &str) -> PathBuf {
        let safe: String = policy_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        self.wallet_dir.join(format!("{safe}.json"))
    }

    // ── Raw JSON access ─────────────────────────────────────────────────

    pub(crate) fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Atomic write: serialize to a sibling tmp file, then rename over the
    /// target so readers never observe a half-written document.
    pub(crate) fn write_json<T: Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // ── Typed accessors ─────────────────────────────────────────────────

    pub(crate) fn load_job(&self) -> Option<SyncJob> {
        self.read_json(&self.job_path())
    }

    pub(crate) fn save_job(&self, job: &SyncJob) -> Result<(), Box<dyn std::error::Error>> {
        self.write_json(&self.job_path(), job)
    }

    pub(crate) fn load_policy_cache(&self, policy_id: &str) -> Option<PolicyAssetCache> {
        self.read_json(&self.policy_path(policy_id))
    }

    pub(crate) fn save_policy_cache(
        &self,
        cache: &PolicyAssetCache,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.write_json(&self.policy_path(&cache.policy.policy_id), cache)
    }

    pub(crate) fn load_index(&self) -> Vec<WalletIndexEntry> {
        self.read_json(&self.index_path()).unwrap_or_default()
    }

    pub(crate) fn save_index(
        &self,
        entries: &[WalletIndexEntry],
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.write_json(&self.index_path(), &entries)
    }

    pub(crate) fn index_exists(&self) -> bool {
        self.index_path().exists()
    }
}
