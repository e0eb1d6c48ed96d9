//! Bulk download of an area into the disk store.
//!
//! Seeding walks every tile intersecting a bounding box at the requested zoom
//! levels and fetches the ones not already on disk, so the area is available
//! later without connectivity. It does not touch any in-memory cache.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SeedError};

use super::address::{tile_count_in_bounds, tiles_in_bounds, TileAddress};
use super::fetcher::{FetchedTile, TileFetcher};

/// Upper bound on the number of tiles a single seed request may cover.
pub const MAX_SEED_TILES: usize = 100_000;

/// Default number of simultaneous downloads.
pub const DEFAULT_SEED_CONCURRENCY: usize = 4;

/// Area and zoom levels to seed.
#[derive(Debug, Clone)]
pub struct SeedRequest {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub zooms: Vec<u8>,

    /// Maximum simultaneous downloads
    pub concurrency: usize,

    /// Skip tiles that already have a file on disk
    pub skip_existing: bool,
}

impl SeedRequest {
    pub fn new(west: f64, south: f64, east: f64, north: f64, zooms: Vec<u8>) -> Self {
        Self {
            west,
            south,
            east,
            north,
            zooms,
            concurrency: DEFAULT_SEED_CONCURRENCY,
            skip_existing: true,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }
}

/// Outcome of a seed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Tiles covered by the request
    pub requested: usize,
    /// Tiles already on disk
    pub skipped: usize,
    /// Tiles downloaded and written to disk
    pub fetched: usize,
    /// Tiles downloaded but not written to disk
    pub unstored: usize,
    /// Tiles whose download or decode failed
    pub failed: usize,
}

/// Download every missing tile of `request` through `fetcher`.
///
/// Individual failures are counted and logged; they never abort the run.
pub async fn seed(fetcher: &TileFetcher, request: &SeedRequest) -> Result<SeedReport, SeedError> {
    if request.concurrency == 0 {
        return Err(SeedError::ZeroConcurrency);
    }

    let count = tile_count_in_bounds(
        request.west,
        request.south,
        request.east,
        request.north,
        &request.zooms,
    )?;
    if count > MAX_SEED_TILES as u64 {
        return Err(SeedError::TooManyTiles {
            count,
            limit: MAX_SEED_TILES,
        });
    }

    let tiles = tiles_in_bounds(
        request.west,
        request.south,
        request.east,
        request.north,
        &request.zooms,
    )?;

    let mut report = SeedReport {
        requested: tiles.len(),
        ..SeedReport::default()
    };

    info!(
        tiles = report.requested,
        zooms = ?request.zooms,
        source = fetcher.source().identifier(),
        "Seeding area"
    );

    let semaphore = Arc::new(Semaphore::new(request.concurrency));
    let mut tasks = JoinSet::new();

    for address in tiles {
        if request.skip_existing && fetcher.store().contains(&address) {
            report.skipped += 1;
            continue;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let fetcher = fetcher.clone();
        tasks.spawn(async move {
            let _permit = permit;
            (address, fetcher.fetch(address).await)
        });

        // Reap finished downloads as we go so the set stays small
        while let Some(done) = tasks.try_join_next() {
            tally(&mut report, done);
        }
    }

    while let Some(done) = tasks.join_next().await {
        tally(&mut report, done);
    }

    info!(
        fetched = report.fetched,
        skipped = report.skipped,
        failed = report.failed,
        unstored = report.unstored,
        "Seeding finished"
    );

    Ok(report)
}

type SeedOutcome = (TileAddress, Result<FetchedTile, FetchError>);

fn tally(report: &mut SeedReport, done: Result<SeedOutcome, tokio::task::JoinError>) {
    match done {
        Ok((address, Ok(fetched))) => {
            if fetched.stored {
                debug!(address = %address, "Seeded tile");
                report.fetched += 1;
            } else {
                report.unstored += 1;
            }
        }
        Ok((address, Err(e))) => {
            warn!(address = %address, error = %e, "Failed to seed tile");
            report.failed += 1;
        }
        Err(e) => {
            warn!(error = %e, "Seed task failed");
            report.failed += 1;
        }
    }
}
