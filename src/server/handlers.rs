//! HTTP request handlers for the tile front end.
//!
//! # Endpoints
//!
//! - `GET /tiles/{z}/{x}/{y}.png` - Serve a tile (placeholder while missing)
//! - `GET /locate?lat=&lon=&zoom=` - Tile containing a position
//! - `POST /cache/clear` - Drop every in-memory tile
//! - `GET /health` - Health check with cache counters

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{CodecError, CoordError};
use crate::tile::{encode, GeoBounds, TileAddress, TileCache, TileFormat, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The tile cache acting as the renderer's tile provider
    pub cache: TileCache,

    /// Encoding of tile responses
    pub format: TileFormat,

    /// Cache-Control max-age for real tiles, in seconds
    pub cache_max_age: u32,

    /// Whether tile requests warm the surrounding 3×3 block first
    pub prefetch: bool,
}

impl AppState {
    pub fn new(cache: TileCache) -> Self {
        Self {
            format: cache.store().format(),
            cache,
            cache_max_age: 3600,
            prefetch: true,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{z}/{x}/{filename}` where filename is `{y}` or
/// `{y}.png` / `{y}.jpg`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub z: u8,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Parse the row from the filename, stripping any image extension.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        let stem = self
            .filename
            .strip_suffix(".png")
            .or_else(|| self.filename.strip_suffix(".jpg"))
            .or_else(|| self.filename.strip_suffix(".jpeg"))
            .unwrap_or(&self.filename);
        stem.parse()
    }
}

/// Query parameters for the locate endpoint.
#[derive(Debug, Deserialize)]
pub struct LocateQueryParams {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub resident_tiles: usize,
    pub in_flight: usize,
    pub cache: crate::tile::CacheStatsSnapshot,
}

/// Response from the locate endpoint.
#[derive(Debug, Serialize)]
pub struct LocateResponse {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub key: String,
    pub bounds: GeoBounds,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced by handlers.
#[derive(Debug)]
pub enum HandlerError {
    /// Malformed tile path
    InvalidTilePath(String),
    /// Position cannot be mapped to a tile
    Coord(CoordError),
    /// Tile could not be encoded for the response
    Codec(CodecError),
    /// Blocking work panicked or was cancelled
    Internal(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            HandlerError::InvalidTilePath(filename) => (
                StatusCode::BAD_REQUEST,
                "invalid_tile_path",
                format!("Invalid tile row: {}", filename),
            ),
            HandlerError::Coord(e) => (StatusCode::BAD_REQUEST, "invalid_position", e.to_string()),
            HandlerError::Codec(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                e.to_string(),
            ),
            HandlerError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message.clone(),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

impl From<CoordError> for HandlerError {
    fn from(err: CoordError) -> Self {
        HandlerError::Coord(err)
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        HandlerError::Codec(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{z}/{x}/{y}.png`
///
/// Always answers `200` with an image. While the tile is being fetched (or
/// offline, or outside the grid) the body is the placeholder and
/// `X-Tile-Placeholder: true` is set together with `Cache-Control: no-store`
/// so clients ask again.
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError> {
    let y = params
        .y()
        .map_err(|_| HandlerError::InvalidTilePath(params.filename.clone()))?;
    let address = TileAddress::new(params.z, params.x, y);

    let cache = state.cache.clone();
    let format = state.format;
    let prefetch = state.prefetch;

    // Disk reads and encoding are blocking work
    let (body, is_placeholder) = tokio::task::spawn_blocking(move || {
        if prefetch {
            cache.prefetch(address.zoom, address.x, address.y);
        }
        let tile = cache.lookup(address);
        encode(tile.image(), format, DEFAULT_JPEG_QUALITY).map(|body| (body, tile.is_placeholder()))
    })
    .await
    .map_err(|e| HandlerError::Internal(e.to_string()))??;

    debug!(address = %address, placeholder = is_placeholder, "Served tile");

    let cache_control = if is_placeholder {
        "no-store".to_string()
    } else {
        format!("public, max-age={}", state.cache_max_age)
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CACHE_CONTROL, cache_control),
            (
                header::HeaderName::from_static("x-tile-placeholder"),
                is_placeholder.to_string(),
            ),
        ],
        body,
    )
        .into_response())
}

/// Handle locate requests.
///
/// # Endpoint
///
/// `GET /locate?lat=46.674&lon=11.132&zoom=16`
pub async fn locate_handler(
    Query(query): Query<LocateQueryParams>,
) -> Result<Json<LocateResponse>, HandlerError> {
    let tile = TileAddress::containing(query.lat, query.lon, query.zoom)?;

    Ok(Json(LocateResponse {
        zoom: tile.zoom,
        x: tile.x,
        y: tile.y,
        key: tile.key(),
        bounds: tile.bounds(),
    }))
}

/// Handle cache clear requests.
///
/// # Endpoint
///
/// `POST /cache/clear`
pub async fn clear_handler(State(state): State<AppState>) -> StatusCode {
    state.cache.clear();
    StatusCode::NO_CONTENT
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        resident_tiles: state.cache.len(),
        in_flight: state.cache.in_flight_count(),
        cache: state.cache.stats(),
    })
}

// =============================================================================
// Tests
// =============================================================================
