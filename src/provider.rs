use std::path::Path;
use std::time::Duration;

use crate::{AssetDetail, AssetRow, PAGE_SIZE, resolve_base_url, resolve_project_id};

const PROVIDER_TIMEOUT_SECS: u64 = 20;

/// The two read-only indexer operations the engine depends on. Every failure
/// mode (non-2xx, transport, parse) collapses into one transient error
/// string; the slice decides whether to retry or skip.
pub(crate) trait AssetProvider {
    /// Page of `{unit, quantity}` rows held by a stake or payment address.
    fn address_assets(&self, target: &str, page: u32) -> Result<Vec<AssetRow>, String>;

    /// Metadata detail for a single asset unit.
    fn asset_detail(&self, unit: &str) -> Result<AssetDetail, String>;
}

pub(crate) struct BlockfrostProvider {
    agent: ureq::Agent,
    base_url: String,
    project_id: String,
}

impl BlockfrostProvider {
    pub(crate) fn new(base_url: String, project_id: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .timeout_read(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .timeout_write(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build();
        BlockfrostProvider {
            agent,
            base_url,
            project_id,
        }
    }

    /// Missing credential is a Configuration error, surfaced to the job as a
    /// terminal state by the caller.
    pub(crate) fn from_config(data_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let Some(project_id) = resolve_project_id(data_dir) else {
            return Err("Missing API Key".into());
        };
        Ok(BlockfrostProvider::new(resolve_base_url(), project_id))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let response = self
            .agent
            .get(url)
            .set("project_id", &self.project_id)
            .call();
        match response {
            Ok(resp) => resp
                .into_json::<T>()
                .map_err(|err| format!("provider parse error: {err}")),
            Err(ureq::Error::Status(code, _)) => Err(format!("provider status {code}")),
            Err(ureq::Error::Transport(err)) => Err(format!("provider transport error: {err}")),
        }
    }
}

/// Reward identifiers (`stake…`) list holdings account-wide; anything else
/// is treated as a payment address.
pub(crate) fn listing_url(base_url: &str, target: &str, page: u32) -> String {
    let encoded = urlencoding::encode(target);
    if target.starts_with("stake") {
        format!("{base_url}/accounts/{encoded}/addresses/assets?page={page}&count={PAGE_SIZE}")
    } else {
        format!("{base_url}/addresses/{encoded}/assets?page={page}&count={PAGE_SIZE}")
    }
}

impl AssetProvider for BlockfrostProvider {
    fn address_assets(&self, target: &str, page: u32) -> Result<Vec<AssetRow>, String> {
        self.get_json(&listing_url(&self.base_url, target, page))
    }

    fn asset_detail(&self, unit: &str) -> Result<AssetDetail, String> {
        let url = format!("{}/assets/{}", self.base_url, urlencoding::encode(unit));
        self.get_json(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stake_target_uses_account_endpoint() {
        let url = listing_url("https://bf.example/api/v0", "stake1uxyz", 3);
        assert_eq!(
            url,
            "https://bf.example/api/v0/accounts/stake1uxyz/addresses/assets?page=3&count=100"
        );
    }

    #[test]
    fn test_payment_target_uses_address_endpoint() {
        let url = listing_url("https://bf.example/api/v0", "addr1qabc", 1);
        assert_eq!(
            url,
            "https://bf.example/api/v0/addresses/addr1qabc/assets?page=1&count=100"
        );
    }
}
