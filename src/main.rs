//! OSM tile cache - a disk-backed slippy-map tile cache and server.
//!
//! This binary wires the cache to an HTTP front end, seeds areas for offline
//! use, and converts positions to tile addresses.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osm_tile_cache::{
    config::{Cli, Command, LocateConfig, SeedConfig, ServeConfig},
    io::{ConnectivityFlag, HttpTileSource, TileStore},
    server::{create_router, RouterConfig},
    tile::{seed, SeedRequest, TileAddress, TileCache, TileFetcher},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Seed(config) => run_seed(config).await,
        Command::Locate(config) => run_locate(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("osm-tile-cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Tile server: {}", config.tile_url);
    info!("  Store: {} ({})", config.cache_dir.display(), config.format);
    info!("  Memory: {} tiles", config.memory_tiles);
    if config.offline {
        warn!("  Network: OFFLINE - only tiles already on disk will be served");
    }

    let source = match HttpTileSource::with_timeout(
        config.tile_url.clone(),
        Duration::from_secs(config.timeout),
    ) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to create tile source: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = Arc::new(TileStore::new(config.cache_dir.clone(), config.format));

    let cache = match TileCache::builder(store, source)
        .capacity(config.memory_tiles)
        .jpeg_quality(config.jpeg_quality)
        .connectivity(Arc::new(ConnectivityFlag::new(!config.offline)))
        .build()
    {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to create tile cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(cache, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/tiles/0/0/0.png -o tile.png", addr);
    info!("    curl 'http://{}/locate?lat=46.674&lon=11.132&zoom=16'", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "osm_tile_cache=debug,tower_http=debug"
    } else {
        "osm_tile_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_prefetch(!config.no_prefetch)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Seed Command
// =============================================================================

async fn run_seed(config: SeedConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match HttpTileSource::with_timeout(
        config.tile_url.clone(),
        Duration::from_secs(config.timeout),
    ) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to create tile source: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = Arc::new(TileStore::new(config.cache_dir.clone(), config.format));
    let fetcher = TileFetcher::new(source, store);

    let bbox = config.bbox;
    let request = SeedRequest::new(bbox.west, bbox.south, bbox.east, bbox.north, config.zooms)
        .with_concurrency(config.concurrency)
        .with_skip_existing(!config.force);

    match seed(&fetcher, &request).await {
        Ok(report) => {
            println!("Requested: {}", report.requested);
            println!("Skipped:   {}", report.skipped);
            println!("Fetched:   {}", report.fetched);
            println!("Unstored:  {}", report.unstored);
            println!("Failed:    {}", report.failed);

            if report.failed > 0 || report.unstored > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("Seeding failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Locate Command
// =============================================================================

fn run_locate(config: LocateConfig) -> ExitCode {
    let tile = match TileAddress::containing(config.lat, config.lon, config.zoom) {
        Ok(tile) => tile,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        let output = serde_json::json!({
            "zoom": tile.zoom,
            "x": tile.x,
            "y": tile.y,
            "key": tile.key(),
            "bounds": tile.bounds(),
        });
        println!("{}", output);
    } else {
        let bounds = tile.bounds();
        println!("{}", tile.key());
        println!(
            "  north={:.6} south={:.6} west={:.6} east={:.6}",
            bounds.north, bounds.south, bounds.west, bounds.east
        );
    }

    ExitCode::SUCCESS
}
