//! # OSM Tile Cache
//!
//! A bounded, disk-backed cache of slippy-map raster tiles.
//!
//! Tiles are resolved memory first, then from a local directory tree laid out
//! as `{zoom}/{x}/{y}.png`, and finally from a remote tile server in the
//! background. Callers are never blocked on the network: while a tile is being
//! downloaded they get a placeholder, and the real tile appears on a later
//! request once the fetch lands.
//!
//! ## Features
//!
//! - **Bounded memory**: FIFO eviction over a small fixed number of decoded tiles
//! - **Write-through disk store**: every downloaded tile is persisted for offline use
//! - **Deduplicated fetches**: at most one download per tile at a time
//! - **Offline mode**: serves memory and disk only when the network is unavailable
//! - **Seeding**: bulk download of an area ahead of time
//! - **HTTP front end**: axum server exposing the cache as a tile endpoint
//!
//! ## Architecture
//!
//! - [`tile`] - Addressing, codec, cache, fetcher and seeding
//! - [`io`] - Disk store, HTTP tile source and connectivity
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use osm_tile_cache::{HttpTileSource, TileCache, TileFormat, TileStore, DEFAULT_TILE_URL};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(TileStore::new("./tiles", TileFormat::Png));
//!     let source = Arc::new(HttpTileSource::new(DEFAULT_TILE_URL)?);
//!     let cache = TileCache::builder(store, source).build()?;
//!
//!     cache.prefetch(16, 34794, 23137);
//!     let _tile = cache.get(16, 34794, 23137);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use config::{BoundingBox, Cli, Command, LocateConfig, SeedConfig, ServeConfig};
pub use error::{CodecError, ConfigError, CoordError, FetchError, SeedError, StoreError};
pub use io::{
    Connectivity, ConnectivityFlag, HttpTileSource, TileSource, TileStore, DEFAULT_TILE_URL,
};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{
    seed, CacheStatsSnapshot, GeoBounds, SeedReport, SeedRequest, Tile, TileAddress, TileCache,
    TileCacheBuilder, TileFetcher, TileFormat, TileImage,
};
