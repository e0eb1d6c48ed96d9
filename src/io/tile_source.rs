use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{ConfigError, FetchError};
use crate::tile::TileAddress;

/// Default tile server.
pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Trait for retrieving encoded tile payloads from a remote server.
///
/// This abstraction lets the cache and the seeder work against mock sources in
/// tests. Implementations must be thread-safe.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the raw encoded tile for `address`.
    async fn fetch(&self, address: &TileAddress) -> Result<Bytes, FetchError>;

    /// Identifier for logging (typically the URL template).
    fn identifier(&self) -> &str;
}

// =============================================================================
// URL Template
// =============================================================================

/// Build the request URL for a tile.
///
/// `{z}`, `{x}` and `{y}` placeholders are substituted. A template without
/// placeholders is a base URL and gets `/{z}/{x}/{y}.png` appended.
pub fn tile_url(template: &str, address: &TileAddress) -> String {
    if template.contains("{z}") || template.contains("{x}") || template.contains("{y}") {
        template
            .replace("{z}", &address.zoom.to_string())
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &address.y.to_string())
    } else {
        format!("{}{}.png", template.trim_end_matches('/'), address.key())
    }
}

/// Check that a template produces absolute http(s) URLs.
pub fn validate_template(template: &str) -> Result<(), ConfigError> {
    let sample = tile_url(template, &TileAddress::new(0, 0, 0));
    let parsed = url::Url::parse(&sample).map_err(|e| ConfigError::InvalidUrl {
        url: template.to_string(),
        message: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            url: template.to_string(),
            message: format!("unsupported scheme '{}'", other),
        }),
    }
}

// =============================================================================
// HTTP Source
// =============================================================================

/// Tile source backed by plain HTTP GET requests.
pub struct HttpTileSource {
    client: reqwest::Client,
    template: String,
}

impl HttpTileSource {
    /// Create a source for the given URL template with the default timeout.
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_timeout(template, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Create a source with a custom request timeout.
    pub fn with_timeout(template: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let template = template.into();
        validate_template(&template)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { client, template })
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, address: &TileAddress) -> Result<Bytes, FetchError> {
        let url = tile_url(&self.template, address);
        debug!(url = %url, "Fetching tile");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { url });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))
    }

    fn identifier(&self) -> &str {
        &self.template
    }
}
