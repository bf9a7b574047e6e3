use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::{
    AssetProvider, Category, EnrichedAsset, JobStatus, PLACEHOLDER_NAME, PolicyAssetCache,
    QueueItem, SliceLock, UserStore, WalletIndexEntry, now_ts, parse_quantity,
};

pub(crate) const DEFAULT_BUDGET_SECS: u64 = 6;
pub(crate) const DEFAULT_MAX_ENRICH: usize = 20;

/// Bounds for one slice: a soft wall-clock budget checked between enrichment
/// items, and a hard ceiling on enrichment calls.
#[derive(Debug, Clone)]
pub(crate) struct SliceOptions {
    pub(crate) budget: Duration,
    pub(crate) max_enrich: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        SliceOptions {
            budget: Duration::from_secs(DEFAULT_BUDGET_SECS),
            max_enrich: DEFAULT_MAX_ENRICH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SliceOutcome {
    /// Another slice holds the lock; nothing was read or written.
    Locked,
    /// No job, or the job is already terminal.
    Idle,
    /// The listing call failed; cursor and state untouched, retry next tick.
    Retry,
    /// The job hit a terminal configuration error this slice.
    Faulted,
    /// Empty page: the job is complete.
    Complete,
    Progress {
        enriched: usize,
        remaining: usize,
        advanced: bool,
    },
}

/// One bounded, resumable unit of sync work. Re-invoking after a crash
/// mid-slice never duplicates or loses an enriched asset and never skips a
/// page: the enrichment queue is recomputed from the cache diff every time,
/// and the cursor only advances once the page's queue is fully drained.
pub(crate) fn run_slice(
    store: &UserStore,
    provider: &dyn AssetProvider,
    opts: &SliceOptions,
) -> Result<SliceOutcome, Box<dyn std::error::Error>> {
    let started = Instant::now();

    let Some(_lock) = SliceLock::try_acquire(&store.lock_path())? else {
        return Ok(SliceOutcome::Locked);
    };

    let Some(mut job) = store.load_job() else {
        return Ok(SliceOutcome::Idle);
    };
    if job.done {
        return Ok(SliceOutcome::Idle);
    }

    let target = job.stake_or_address.trim().to_string();
    if target.is_empty() {
        job.finish(JobStatus::Error, "No wallet address to sync.");
        store.save_job(&job)?;
        return Ok(SliceOutcome::Faulted);
    }

    // Transient provider failure: hold the cursor, the next tick retries the
    // same page.
    let rows = match provider.address_assets(&target, job.page) {
        Ok(rows) => rows,
        Err(err) => {
            eprintln!("[slice] listing page {} failed: {err}", job.page);
            return Ok(SliceOutcome::Retry);
        }
    };

    if rows.is_empty() {
        job.finish(JobStatus::Complete, "Wallet sync complete");
        store.save_job(&job)?;
        return Ok(SliceOutcome::Complete);
    }

    // Partition rows by policy id (first 56 hex chars of the unit) and load
    // each policy's cache once.
    let mut policy_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let Some(pid) = row.unit.get(..56) else {
            continue;
        };
        groups.entry(pid.to_string()).or_insert_with(|| {
            policy_order.push(pid.to_string());
            Vec::new()
        });
        if let Some(indices) = groups.get_mut(pid) {
            indices.push(i);
        }
    }

    let mut caches: HashMap<String, PolicyAssetCache> = HashMap::new();
    let mut existing: HashMap<String, HashSet<String>> = HashMap::new();
    for pid in &policy_order {
        let cache = store
            .load_policy_cache(pid)
            .unwrap_or_else(|| PolicyAssetCache::new(pid));
        let units: HashSet<String> = cache
            .assets_cache
            .iter()
            .map(|asset| asset.asset.clone())
            .collect();
        existing.insert(pid.clone(), units);
        caches.insert(pid.clone(), cache);
    }

    // The enrichment queue is the diff between this page and the caches, in
    // row arrival order. It is never persisted.
    let mut queue: Vec<QueueItem> = Vec::new();
    for row in &rows {
        let Some(pid) = row.unit.get(..56) else {
            continue;
        };
        let known = existing
            .get(pid)
            .map(|units| units.contains(&row.unit))
            .unwrap_or(false);
        if !known {
            queue.push(QueueItem {
                unit: row.unit.clone(),
                policy_id: pid.to_string(),
                quantity: row.quantity.clone(),
            });
        }
    }

    let mut index: HashMap<String, WalletIndexEntry> = store
        .load_index()
        .into_iter()
        .map(|entry| (entry.id.clone(), entry))
        .collect();
    let mut index_dirty = false;

    // Policies never seen before get a provisional entry with a category
    // guessed from quantity alone and a count seeded from this page's rows,
    // so a persisted entry never shows an empty holding. The provisional
    // write does not mark the index dirty; only a real enrichment event
    // forces a persisted update, so an index entry never ships without a
    // chance at a name/thumbnail.
    for pid in &policy_order {
        if index.contains_key(pid) {
            continue;
        }
        let group = groups.get(pid);
        let first_qty = group
            .and_then(|indices| indices.first())
            .map(|&i| parse_quantity(&rows[i].quantity))
            .unwrap_or(1.0);
        let on_page = group.map(|indices| indices.len()).unwrap_or(0);
        let category = if first_qty > 1000.0 {
            Category::RichFt
        } else if first_qty > 1.0 {
            Category::Edition
        } else {
            Category::Nft
        };
        index.insert(
            pid.clone(),
            WalletIndexEntry {
                id: pid.clone(),
                name: PLACEHOLDER_NAME.to_string(),
                count: on_page as u64,
                thumb: String::new(),
                kind: "wallet".to_string(),
                category,
                updated_at: now_ts(),
            },
        );
    }

    // Enrich in arrival order until the ceiling or the budget runs out. A
    // failed detail fetch skips the item; the recomputed diff brings it back
    // next slice.
    let mut enriched = 0usize;
    let mut dirty_caches: HashSet<String> = HashSet::new();
    for item in &queue {
        if enriched >= opts.max_enrich || started.elapsed() > opts.budget {
            break;
        }
        let detail = match provider.asset_detail(&item.unit) {
            Ok(detail) => detail,
            Err(err) => {
                eprintln!("[slice] detail {} failed: {err}", item.unit);
                continue;
            }
        };
        let meta = detail.resolved_metadata();
        let Some(cache) = caches.get_mut(&item.policy_id) else {
            continue;
        };
        cache.assets_cache.push(EnrichedAsset {
            asset: item.unit.clone(),
            quantity: item.quantity.clone(),
            policy_id: item.policy_id.clone(),
            asset_name: item.unit.get(56..).unwrap_or_default().to_string(),
            onchain_metadata: meta.clone(),
        });
        dirty_caches.insert(item.policy_id.clone());

        if let Some(entry) = index.get_mut(&item.policy_id) {
            refine_entry(entry, &meta, parse_quantity(&item.quantity));
            // The cache is authoritative; keep the denormalized count in
            // step with it rather than trusting the previous index value.
            entry.count = cache.assets_cache.len() as u64;
            entry.updated_at = now_ts();
        }
        index_dirty = true;
        enriched += 1;
    }

    for pid in &dirty_caches {
        if let Some(cache) = caches.get(pid) {
            store.save_policy_cache(cache)?;
        }
    }

    // Anti-flicker: only rewrite the index when an entry actually changed.
    if index_dirty {
        let mut entries: Vec<WalletIndexEntry> = index.into_values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        store.save_index(&entries)?;
    }

    let remaining = queue.len() - enriched;
    let advanced = remaining == 0;
    if advanced {
        job.page += 1;
        job.touch(format!("Scanning page {}...", job.page));
    } else {
        job.touch(format!("Processing assets... ({remaining} remaining)"));
    }
    job.status = JobStatus::Running;
    store.save_job(&job)?;

    Ok(SliceOutcome::Progress {
        enriched,
        remaining,
        advanced,
    })
}

// ── Classification ──────────────────────────────────────────────────────

/// Category rule applied per enriched asset, in order:
/// ticker/token-word without files → FT; large supply with media → RICH_FT;
/// small multi-supply without a serial name → EDITION; everything else NFT.
pub(crate) fn classify(meta: &Value, quantity: f64) -> Category {
    let name = meta.get("name").and_then(Value::as_str).unwrap_or("");
    let lower = name.to_lowercase();
    let has_token_word = lower.contains("token") || lower.contains("coin");
    let has_ticker = meta.get("ticker").is_some() || meta.get("symbol").is_some();
    let has_files = meta
        .get("files")
        .and_then(Value::as_array)
        .map(|files| !files.is_empty())
        .unwrap_or(false);
    let has_rich_image = meta
        .get("image")
        .and_then(Value::as_str)
        .map(|image| image.contains("ipfs") || image.contains("http"))
        .unwrap_or(false);

    if (has_ticker || has_token_word) && !has_files {
        Category::Ft
    } else if quantity > 1000.0 && !has_ticker && !has_token_word && (has_files || has_rich_image) {
        Category::RichFt
    } else if quantity > 1.0 && quantity <= 1000.0 && !has_serial_suffix(name) {
        Category::Edition
    } else {
        Category::Nft
    }
}

/// Trailing "#<digits>" marks a 1-of-N series entry ("Cool Cat #412").
fn has_serial_suffix(name: &str) -> bool {
    let Some(idx) = name.rfind('#') else {
        return false;
    };
    let digits = &name[idx + 1..];
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Refine an index entry from freshly fetched metadata. Entries that already
/// carry a real name and a thumbnail are settled; only their count moves.
fn refine_entry(entry: &mut WalletIndexEntry, meta: &Value, quantity: f64) {
    let settled = entry.name != PLACEHOLDER_NAME && !entry.thumb.is_empty();
    if settled {
        return;
    }
    if let Some(name) = meta.get("name").and_then(Value::as_str) {
        entry.name = name.to_string();
    }
    if let Some(image) = meta.get("image").and_then(Value::as_str) {
        entry.thumb = image.to_string();
    }
    entry.category = classify(meta, quantity);
}
