//! HTTP front end for the tile cache.
//!
//! Exposes a shared [`TileCache`](crate::tile::TileCache) as a slippy-map tile
//! endpoint so any web map can use it as its tile layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   HTTP Layer                    │
//! │          GET /tiles/{z}/{x}/{y}.png             │
//! │                                                 │
//! │  ┌─────────────────┐  ┌──────────────────────┐  │
//! │  │    handlers     │  │        routes        │  │
//! │  │   (requests)    │  │   (router config)    │  │
//! │  └─────────────────┘  └──────────────────────┘  │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    clear_handler, health_handler, locate_handler, tile_handler, AppState, ErrorResponse,
    HandlerError, HealthResponse, LocateQueryParams, LocateResponse, TilePathParams,
};
pub use routes::{create_router, RouterConfig};
