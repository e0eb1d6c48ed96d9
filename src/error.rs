use std::path::PathBuf;

use thiserror::Error;

use crate::tile::TileAddress;

/// Errors from geographic to tile coordinate conversion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude is outside the Web Mercator range or not finite
    #[error("Invalid latitude: {0} (must be within ±85.0511287798)")]
    InvalidLatitude(f64),

    /// Longitude is outside -180..=180 or not finite
    #[error("Invalid longitude: {0} (must be within -180..=180)")]
    InvalidLongitude(f64),

    /// Zoom level exceeds the supported maximum
    #[error("Invalid zoom level: {zoom} (maximum is {max})")]
    InvalidZoom { zoom: u8, max: u8 },

    /// Bounding box corners are in the wrong order
    #[error("Invalid bounds: west={west} south={south} east={east} north={north}")]
    InvalidBounds {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
}

/// Errors from decoding or encoding tile images
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Payload could not be decoded into an image
    #[error("Failed to decode tile image: {message}")]
    Decode { message: String },

    /// Image could not be encoded into the target format
    #[error("Failed to encode tile image: {message}")]
    Encode { message: String },

    /// Unknown tile format name
    #[error("Unsupported tile format: {0} (expected png or jpeg)")]
    UnsupportedFormat(String),
}

/// Errors from the on-disk tile store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading a tile file failed for a reason other than absence
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating directories or writing the tile file failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from fetching a tile over the network
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The tile server does not have this tile
    #[error("Tile not found on server: {url}")]
    NotFound { url: String },

    /// The tile server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The payload is not a decodable image
    #[error("Invalid tile payload for {address}: {source}")]
    Codec {
        address: TileAddress,
        #[source]
        source: CodecError,
    },

    /// The address is outside the tile grid
    #[error("Invalid tile address: {0}")]
    InvalidAddress(TileAddress),

    /// The background task running the fetch failed
    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Errors from bulk seeding an area
#[derive(Debug, Error)]
pub enum SeedError {
    /// Area or zoom levels are invalid
    #[error("Invalid seed area: {0}")]
    Coord(#[from] CoordError),

    /// The request expands to more tiles than allowed
    #[error("Seed request covers {count} tiles (limit is {limit})")]
    TooManyTiles { count: u64, limit: usize },

    /// Concurrency must be at least one
    #[error("Seed concurrency must be greater than 0")]
    ZeroConcurrency,
}

/// Errors from building library components
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Memory capacity of zero would evict every tile immediately
    #[error("Tile cache capacity must be greater than 0")]
    ZeroCapacity,

    /// No tokio runtime available to run background fetches
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Tile server URL is malformed
    #[error("Invalid tile server URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}
