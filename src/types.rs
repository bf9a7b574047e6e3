use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::now_ts;

pub(crate) const PAGE_SIZE: u32 = 100;
pub(crate) const PLACEHOLDER_NAME: &str = "Wallet Collection";

// ── Sync job ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum JobStatus {
    Idle,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// One sync job per user. `done` is true exactly when `status` is terminal;
/// every mutation goes through the helpers below to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SyncJob {
    pub(crate) status: JobStatus,
    pub(crate) page: u32,
    pub(crate) done: bool,
    pub(crate) message: String,
    #[serde(rename = "startedAt")]
    pub(crate) started_at: i64,
    #[serde(rename = "updatedAt")]
    pub(crate) updated_at: i64,
    #[serde(rename = "stakeOrAddress", default)]
    pub(crate) stake_or_address: String,
}

impl SyncJob {
    pub(crate) fn new(stake_or_address: &str) -> Self {
        let now = now_ts();
        SyncJob {
            status: JobStatus::Running,
            page: 1,
            done: false,
            message: "Starting scan...".to_string(),
            started_at: now,
            updated_at: now,
            stake_or_address: stake_or_address.to_string(),
        }
    }

    /// Synthetic snapshot reported when no job file exists.
    pub(crate) fn idle() -> Self {
        let now = now_ts();
        SyncJob {
            status: JobStatus::Idle,
            page: 1,
            done: true,
            message: String::new(),
            started_at: now,
            updated_at: now,
            stake_or_address: String::new(),
        }
    }

    pub(crate) fn touch(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.updated_at = now_ts();
    }

    pub(crate) fn finish(&mut self, status: JobStatus, message: impl Into<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.done = true;
        self.message = message.into();
        self.updated_at = now_ts();
    }
}

// ── Provider rows ───────────────────────────────────────────────────────

/// One row of the paginated "assets held by address" listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AssetRow {
    pub(crate) unit: String,
    #[serde(default = "default_quantity")]
    pub(crate) quantity: String,
}

fn default_quantity() -> String {
    "1".to_string()
}

/// Single-asset detail lookup. Both metadata fields may be absent or null;
/// `onchain_metadata` wins when it is an object.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AssetDetail {
    #[serde(default)]
    pub(crate) asset_name: Option<String>,
    #[serde(default)]
    pub(crate) onchain_metadata: Option<Value>,
    #[serde(default)]
    pub(crate) metadata: Option<Value>,
}

impl AssetDetail {
    pub(crate) fn resolved_metadata(&self) -> Value {
        for candidate in [&self.onchain_metadata, &self.metadata] {
            if let Some(value) = candidate {
                if value.is_object() {
                    return value.clone();
                }
            }
        }
        Value::Object(serde_json::Map::new())
    }
}

// ── Persisted caches ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheMeta {
    pub(crate) name: String,
    #[serde(rename = "addedAt")]
    pub(crate) added_at: i64,
    #[serde(rename = "type")]
    pub(crate) kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PolicyRef {
    #[serde(rename = "policyId")]
    pub(crate) policy_id: String,
}

/// Fully enriched asset as stored in a policy cache. Field names match the
/// on-disk cache format consumed by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EnrichedAsset {
    pub(crate) asset: String,
    pub(crate) quantity: String,
    pub(crate) policy_id: String,
    pub(crate) asset_name: String,
    pub(crate) onchain_metadata: Value,
}

/// One per (user, policy id). `assets_cache` is append-only under sync; a
/// unit appears at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PolicyAssetCache {
    pub(crate) meta: CacheMeta,
    pub(crate) policy: PolicyRef,
    #[serde(default)]
    pub(crate) assets_cache: Vec<EnrichedAsset>,
}

impl PolicyAssetCache {
    pub(crate) fn new(policy_id: &str) -> Self {
        PolicyAssetCache {
            meta: CacheMeta {
                name: PLACEHOLDER_NAME.to_string(),
                added_at: now_ts(),
                kind: "wallet".to_string(),
            },
            policy: PolicyRef {
                policy_id: policy_id.to_string(),
            },
            assets_cache: Vec::new(),
        }
    }
}

// ── Wallet index ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Category {
    #[serde(rename = "NFT")]
    Nft,
    #[serde(rename = "FT")]
    Ft,
    #[serde(rename = "EDITION")]
    Edition,
    #[serde(rename = "RICH_FT")]
    RichFt,
}

/// Denormalized per-policy summary for the UI. Rebuildable from the policy
/// caches; never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WalletIndexEntry {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) count: u64,
    #[serde(default)]
    pub(crate) thumb: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) category: Category,
    #[serde(rename = "updatedAt")]
    pub(crate) updated_at: i64,
}

// ── Transient slice state ───────────────────────────────────────────────

/// Enrichment work item, recomputed fresh each slice from the diff between
/// the provider page and the policy cache. Never persisted.
#[derive(Debug, Clone)]
pub(crate) struct QueueItem {
    pub(crate) unit: String,
    pub(crate) policy_id: String,
    pub(crate) quantity: String,
}

pub(crate) fn parse_quantity(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(1.0)
}

// ── Entry-point responses ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct StartResponse {
    pub(crate) status: String,
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct JobEnvelope {
    pub(crate) status: String,
    pub(crate) job: SyncJob,
}

impl JobEnvelope {
    pub(crate) fn success(job: SyncJob) -> Self {
        JobEnvelope {
            status: "success".to_string(),
            job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_sets_done() {
        let mut job = SyncJob::new("stake1abc");
        assert!(!job.done);
        job.finish(JobStatus::Complete, "Wallet sync complete");
        assert!(job.done);
        assert_eq!(job.status, JobStatus::Complete);
    }

    #[test]
    fn test_idle_snapshot_is_done() {
        let job = SyncJob::idle();
        assert!(job.done);
        assert_eq!(job.status, JobStatus::Idle);
    }

    #[test]
    fn test_metadata_fallback_order() {
        let detail = AssetDetail {
            asset_name: None,
            onchain_metadata: Some(serde_json::json!("not an object")),
            metadata: Some(serde_json::json!({"name": "Fallback"})),
        };
        assert_eq!(detail.resolved_metadata()["name"], "Fallback");

        let empty = AssetDetail::default();
        assert!(empty.resolved_metadata().as_object().unwrap().is_empty());
    }

    #[test]
    fn test_job_json_field_names() {
        let job = SyncJob::new("addr1xyz");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "running");
        assert!(value.get("startedAt").is_some());
        assert!(value.get("stakeOrAddress").is_some());
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(serde_json::to_value(Category::RichFt).unwrap(), "RICH_FT");
        assert_eq!(serde_json::to_value(Category::Nft).unwrap(), "NFT");
    }
}
