use reqwest::Client;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::models::RawInventory;
use crate::normalization::inventory::bucket_keys;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Pet store inventory client.
///
/// Endpoint: `GET {scheme}://{host}{path}` (public default
/// `https://petstore.swagger.io/v2/store/inventory`), returning a JSON object
/// of status name to count. No auth, no query parameters, no retries here;
/// retrying is the orchestrator's job.
#[derive(Debug, Clone)]
pub struct PetstoreProvider {
    http: Client,
}

/// Build the inventory URL from its parts. `host` may carry a port.
pub fn inventory_url(host: &str, path: &str, secure: bool) -> Result<Url> {
    let scheme = if secure { "https" } else { "http" };
    let raw = format!("{scheme}://{host}{path}");
    Url::parse(&raw).map_err(|source| PipelineError::InvalidUrl { url: raw, source })
}

fn check_bucket_counts(stats: &RawInventory) -> Result<()> {
    for key in bucket_keys() {
        match stats.get(key) {
            None => {}
            Some(v) if v.is_i64() => {}
            Some(v) => {
                return Err(PipelineError::NonIntegerCount {
                    key: key.to_string(),
                    value: v.clone(),
                })
            }
        }
    }
    Ok(())
}

impl PetstoreProvider {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let http = Client::builder()
            .user_agent(concat!("petstore-inventory/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Fetch the raw inventory mapping. Non-2xx responses, bodies that are not
    /// a JSON object, and non-integer values under a bucket key are errors.
    /// Keys outside the buckets are passed through whatever their type.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, host: &str, path: &str, secure: bool) -> Result<RawInventory> {
        let url = inventory_url(host, path, secure)?;
        let resp = self.http.get(url.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = resp.bytes().await?;
        let stats: RawInventory = serde_json::from_slice(&body)?;
        check_bucket_counts(&stats)?;
        info!(url = %url, inventory = ?stats, "retrieved inventory");
        Ok(stats)
    }
}
