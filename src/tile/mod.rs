//! Tile cache layer.
//!
//! This module provides addressing, decoding, caching and fetching of
//! slippy-map raster tiles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Renderer / HTTP front          │
//! └────────────────────┬────────────────────┘
//!                      │ get / prefetch / clear
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileCache                 │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ memory (FIFO │  │  in-flight set  │  │
//! │  │  16 tiles)   │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └──────────┬─────────────────┬────────────┘
//!            │ read            │ dispatch
//!            ▼                 ▼
//! ┌──────────────────┐  ┌──────────────────┐
//! │    TileStore     │◀─│   TileFetcher    │──▶ TileSource (HTTP)
//! │ {z}/{x}/{y}.png  │  │  (tokio task)    │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileAddress`]: `(zoom, x, y)` key plus projection helpers
//! - [`TileCache`]: bounded memory cache and miss orchestration
//! - [`TileFetcher`]: network fetch, decode and write-through
//! - [`seed()`]: bulk download of an area into the disk store
//! - [`TileFormat`] and the codec helpers: PNG/JPEG encode and decode

mod address;
mod cache;
mod codec;
mod fetcher;
mod seed;

pub use address::{
    tile_count_in_bounds, tile_to_lat, tile_to_lon, tiles_in_bounds, tiles_per_side, GeoBounds,
    TileAddress, MAX_LATITUDE, MAX_ZOOM,
};
pub use cache::{CacheStatsSnapshot, Tile, TileCache, TileCacheBuilder, DEFAULT_MEMORY_CAPACITY};
pub use codec::{
    blank_tile, decode, encode, prepare_for_store, TileFormat, TileImage, DEFAULT_JPEG_QUALITY,
    TILE_SIZE,
};
pub use fetcher::{FetchedTile, TileFetcher};
pub use seed::{seed, SeedReport, SeedRequest, DEFAULT_SEED_CONCURRENCY, MAX_SEED_TILES};
