//! Exchange endpoints and feed selection.

use serde::Deserialize;

/// Depth limits accepted by the REST snapshot endpoint.
pub const SNAPSHOT_LIMITS: [u32; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];

/// Exchange network endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket base URL for streaming market data.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// REST base URL for order-book snapshots.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_ws_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_api_url() -> String {
    "https://api.binance.com".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
        }
    }
}

/// Order-book feed selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepthConfig {
    /// Symbols to maintain a local book for.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Levels requested per side in each snapshot.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Depth updates kept while waiting for a snapshot.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

const fn default_limit() -> u32 {
    100
}

const fn default_max_pending() -> usize {
    10_000
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            limit: default_limit(),
            max_pending: default_max_pending(),
        }
    }
}

/// Trade feed selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TradeConfig {
    #[serde(default)]
    pub symbols: Vec<String>,
}
