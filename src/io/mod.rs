mod connectivity;
mod tile_source;
mod tile_store;

pub use connectivity::{Connectivity, ConnectivityFlag};
pub use tile_source::{
    tile_url, validate_template, HttpTileSource, TileSource, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TILE_URL,
};
pub use tile_store::TileStore;
