//! REST order-book snapshots.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, warn};
use url::Url;

use super::dto::DepthSnapshotDto;
use crate::domain::id::Symbol;
use crate::error::{Error, Result};
use crate::port::{BookSnapshot, SnapshotProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`SnapshotProvider`] backed by `GET /api/v3/depth`.
pub struct RestSnapshotProvider {
    http: HttpClient,
    base_url: Url,
}

impl RestSnapshotProvider {
    /// Create a provider for the REST base URL (e.g. `https://api.binance.com`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `base_url` does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    /// Request URL for one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the base URL cannot carry a path.
    pub fn depth_url(&self, symbol: &Symbol, limit: u32) -> Result<Url> {
        let mut url = self.base_url.join("/api/v3/depth")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol.as_str())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }
}

#[async_trait]
impl SnapshotProvider for RestSnapshotProvider {
    async fn order_book_snapshot(&self, symbol: &Symbol, limit: u32) -> Result<BookSnapshot> {
        let url = self.depth_url(symbol, limit)?;
        debug!(%symbol, limit, "Fetching order book snapshot");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Connection(format!(
                "snapshot request for {symbol} failed with {status}: {body}"
            )));
        }

        let dto = response.json::<DepthSnapshotDto>().await?;
        debug!(%symbol, last_update_id = dto.last_update_id, "Snapshot received");
        Ok(dto.into_snapshot(symbol.clone()))
    }
}
