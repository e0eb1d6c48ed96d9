//! Configuration management for the tile cache.
//!
//! This module provides the command-line interface:
//! - Subcommands for serving, seeding and locating tiles
//! - Environment variables with `TILES_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `TILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILES_PORT` - Server port (default: 3000)
//! - `TILES_CACHE_DIR` - Root of the on-disk tile store (default: ./tiles)
//! - `TILES_URL` - Tile server base URL or `{z}/{x}/{y}` template
//! - `TILES_FORMAT` - On-disk and response format, png or jpeg (default: png)
//! - `TILES_MEMORY` - Decoded tiles kept in memory (default: 16)
//! - `TILES_JPEG_QUALITY` - JPEG quality when re-encoding (default: 90)
//! - `TILES_TIMEOUT` - Tile request timeout in seconds (default: 30)
//! - `TILES_OFFLINE` - Never hit the network (default: false)
//! - `TILES_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `TILES_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};

use crate::io::{validate_template, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TILE_URL};
use crate::tile::{
    TileFormat, DEFAULT_JPEG_QUALITY, DEFAULT_MEMORY_CAPACITY, DEFAULT_SEED_CONCURRENCY, MAX_ZOOM,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default root of the on-disk tile store.
pub const DEFAULT_CACHE_DIR: &str = "./tiles";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// OSM tile cache - a disk-backed slippy-map tile cache and server.
#[derive(Parser, Debug, Clone)]
#[command(name = "osm-tile-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles over HTTP through the memory/disk/network cache.
    Serve(ServeConfig),

    /// Download an area into the on-disk store for offline use.
    Seed(SeedConfig),

    /// Print the tile containing a position.
    Locate(LocateConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILES_PORT")]
    pub port: u16,

    // =========================================================================
    // Tile Source and Store
    // =========================================================================
    /// Root directory of the on-disk tile store.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "TILES_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Tile server base URL, or a template containing {z}, {x} and {y}.
    #[arg(long, default_value = DEFAULT_TILE_URL, env = "TILES_URL")]
    pub tile_url: String,

    /// Tile format on disk and in responses (png or jpeg).
    #[arg(long, default_value_t = TileFormat::Png, env = "TILES_FORMAT")]
    pub format: TileFormat,

    /// Tile request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "TILES_TIMEOUT")]
    pub timeout: u64,

    /// Never contact the tile server; serve memory and disk only.
    #[arg(long, default_value_t = false, env = "TILES_OFFLINE")]
    pub offline: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Number of decoded tiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "TILES_MEMORY")]
    pub memory_tiles: usize,

    /// JPEG quality when re-encoding tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "TILES_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILES_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Do not prefetch the surrounding 3×3 block on tile requests.
    #[arg(long, default_value_t = false)]
    pub no_prefetch: bool,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILES_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.memory_tiles == 0 {
            return Err("memory_tiles must be greater than 0".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        validate_template(&self.tile_url).map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for the `seed` command.
#[derive(Args, Debug, Clone)]
pub struct SeedConfig {
    /// Bounding box as west,south,east,north in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: BoundingBox,

    /// Zoom levels, e.g. "12", "10,12" or "10-14".
    #[arg(short, long, value_parser = parse_zooms)]
    pub zooms: ZoomList,

    /// Root directory of the on-disk tile store.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "TILES_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Tile server base URL, or a template containing {z}, {x} and {y}.
    #[arg(long, default_value = DEFAULT_TILE_URL, env = "TILES_URL")]
    pub tile_url: String,

    /// Tile format on disk (png or jpeg).
    #[arg(long, default_value_t = TileFormat::Png, env = "TILES_FORMAT")]
    pub format: TileFormat,

    /// Simultaneous downloads.
    #[arg(short, long, default_value_t = DEFAULT_SEED_CONCURRENCY)]
    pub concurrency: usize,

    /// Download tiles even when they already exist on disk.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Tile request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "TILES_TIMEOUT")]
    pub timeout: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SeedConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        validate_template(&self.tile_url).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Options for the `locate` command.
#[derive(Args, Debug, Clone)]
pub struct LocateConfig {
    /// Latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Zoom level.
    #[arg(short, long)]
    pub zoom: u8,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

// =============================================================================
// Value Parsers
// =============================================================================

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid bbox '{}': {}", s, e))?;

        match values.as_slice() {
            &[west, south, east, north] => Ok(Self {
                west,
                south,
                east,
                north,
            }),
            _ => Err(format!(
                "invalid bbox '{}': expected west,south,east,north",
                s
            )),
        }
    }
}

/// Sorted, de-duplicated zoom levels.
pub type ZoomList = Vec<u8>;

/// Parse a zoom list such as `"12"`, `"10,12"`, `"10-14"` or `"8,10-12"`.
pub fn parse_zooms(s: &str) -> Result<ZoomList, String> {
    let mut zooms = Vec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_zoom(start)?;
                let end = parse_zoom(end)?;
                if start > end {
                    return Err(format!("invalid zoom range '{}': start exceeds end", part));
                }
                zooms.extend(start..=end);
            }
            None => zooms.push(parse_zoom(part)?),
        }
    }

    if zooms.is_empty() {
        return Err("at least one zoom level is required".to_string());
    }

    zooms.sort_unstable();
    zooms.dedup();
    Ok(zooms)
}

fn parse_zoom(s: &str) -> Result<u8, String> {
    let zoom: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid zoom level '{}'", s.trim()))?;
    if zoom > MAX_ZOOM {
        return Err(format!("zoom level {} exceeds maximum {}", zoom, MAX_ZOOM));
    }
    Ok(zoom)
}

// =============================================================================
// Tests
// =============================================================================
