//! Background network retrieval with write-through to disk.
//!
//! A [`TileFetcher`] performs one tile's full miss path: HTTP GET through the
//! configured [`TileSource`], decode, persist to the [`TileStore`]. The cache
//! runs each fetch as an independent tokio task so callers never wait on the
//! network; the seeder awaits fetches directly.
//!
//! Failures are logged and dropped. Nothing is retried here: the renderer asks
//! again on its next redraw, and the cache will dispatch a new fetch then.

use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::io::{TileSource, TileStore};

use super::address::TileAddress;
use super::cache::TileCache;
use super::codec::{self, TileImage, DEFAULT_JPEG_QUALITY};

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    /// The decoded tile
    pub image: TileImage,

    /// Whether the tile was persisted to disk
    pub stored: bool,
}

/// Network fetch and write-through worker.
#[derive(Clone)]
pub struct TileFetcher {
    source: Arc<dyn TileSource>,
    store: Arc<TileStore>,
    jpeg_quality: u8,
}

impl TileFetcher {
    /// Create a fetcher writing into `store`.
    pub fn new(source: Arc<dyn TileSource>, store: Arc<TileStore>) -> Self {
        Self {
            source,
            store,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality used when a payload must be re-encoded for disk.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// The disk store fetched tiles are written to.
    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    /// The remote tile source.
    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    /// Fetch, decode and persist one tile.
    ///
    /// A failed disk write is logged and reported through
    /// [`FetchedTile::stored`]; it does not fail the fetch.
    pub async fn fetch(&self, address: TileAddress) -> Result<FetchedTile, FetchError> {
        if !address.is_valid() {
            return Err(FetchError::InvalidAddress(address));
        }

        let payload = self.source.fetch(&address).await?;
        debug!(address = %address, bytes = payload.len(), "Downloaded tile");

        let store = Arc::clone(&self.store);
        let quality = self.jpeg_quality;

        // Decoding and disk I/O stay off the async workers
        tokio::task::spawn_blocking(move || decode_and_store(&store, address, payload, quality))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?
    }

    /// Spawn a detached fetch that populates `cache` on success.
    ///
    /// `guard` is held until the task ends, however it ends, so the address
    /// always leaves the in-flight set exactly once.
    pub(crate) fn dispatch(
        &self,
        runtime: &Handle,
        cache: TileCache,
        address: TileAddress,
        guard: InFlightGuard,
    ) {
        let fetcher = self.clone();
        runtime.spawn(async move {
            let _guard = guard;
            match fetcher.fetch(address).await {
                Ok(fetched) => {
                    cache.put(address, fetched.image);
                    cache.record_fetch_success();
                }
                Err(e) => {
                    cache.record_fetch_failure();
                    warn!(
                        address = %address,
                        source = fetcher.source.identifier(),
                        error = %e,
                        "Tile fetch failed"
                    );
                }
            }
        });
    }
}

fn decode_and_store(
    store: &TileStore,
    address: TileAddress,
    payload: Bytes,
    quality: u8,
) -> Result<FetchedTile, FetchError> {
    let image = codec::decode(&payload).map_err(|source| FetchError::Codec { address, source })?;

    let stored = match codec::prepare_for_store(&payload, &image, store.format(), quality) {
        Ok(data) => match store.write(&address, &data) {
            Ok(()) => true,
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to persist tile");
                false
            }
        },
        Err(e) => {
            warn!(address = %address, error = %e, "Failed to encode tile for disk");
            false
        }
    };

    Ok(FetchedTile {
        image: Arc::new(image),
        stored,
    })
}

// =============================================================================
// In-Flight Guard
// =============================================================================

/// Removes an address from the cache's in-flight set when dropped.
pub(crate) struct InFlightGuard {
    cache: TileCache,
    address: TileAddress,
}

impl InFlightGuard {
    pub(crate) fn new(cache: TileCache, address: TileAddress) -> Self {
        Self { cache, address }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.cache.finish_in_flight(&self.address);
    }
}
