//! Bounded in-memory tile cache with disk and network fallback.
//!
//! [`TileCache::get`] resolves a tile in three tiers:
//!
//! ```text
//!   memory ──miss──▶ disk ──miss/corrupt──▶ network (background)
//!     │                │                        │
//!   return          decode, put,          placeholder now,
//!                   return                put when it lands
//! ```
//!
//! # Eviction
//!
//! Entries are evicted strictly in insertion order (FIFO), not by access.
//! Reads use `peek`, so looking a tile up never changes its position; only
//! (re-)inserting moves a tile to the back. The renderer re-requests the same
//! 3×3 neighbourhood on every redraw, and that access pattern is what the
//! default capacity of 16 is sized for.
//!
//! # Locking
//!
//! The memory map, the in-flight set and the placeholder live behind one
//! mutex so they always change together. The lock is never held across disk
//! or network I/O.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::error::ConfigError;
use crate::io::{Connectivity, ConnectivityFlag, TileSource, TileStore};

use super::address::TileAddress;
use super::codec::{self, blank_tile, TileImage, DEFAULT_JPEG_QUALITY, TILE_SIZE};
use super::fetcher::{InFlightGuard, TileFetcher};

/// Default number of decoded tiles kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 16;

// =============================================================================
// Statistics
// =============================================================================

#[derive(Default)]
struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    placeholders_served: AtomicU64,
    fetches_dispatched: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    evictions: AtomicU64,
    corrupt_files: AtomicU64,
}

impl CacheStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub placeholders_served: u64,
    pub fetches_dispatched: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub evictions: u64,
    pub corrupt_files: u64,
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    /// Decoded tiles; iteration order is insertion order
    tiles: LruCache<TileAddress, TileImage>,
    /// Addresses with a network fetch currently running
    in_flight: HashSet<TileAddress>,
    /// Image handed out while a tile is unavailable
    placeholder: Option<TileImage>,
}

impl CacheState {
    fn placeholder(&mut self) -> TileImage {
        self.placeholder
            .get_or_insert_with(|| blank_tile(TILE_SIZE))
            .clone()
    }
}

struct CacheInner {
    state: Mutex<CacheState>,
    capacity: usize,
    store: Arc<TileStore>,
    fetcher: TileFetcher,
    connectivity: Arc<dyn Connectivity>,
    runtime: Handle,
    stats: CacheStats,
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum Tile {
    /// The real tile, from memory or disk
    Resident(TileImage),
    /// Stand-in image while the tile is unavailable
    Placeholder(TileImage),
}

impl Tile {
    pub fn image(&self) -> &TileImage {
        match self {
            Tile::Resident(image) | Tile::Placeholder(image) => image,
        }
    }

    pub fn into_image(self) -> TileImage {
        match self {
            Tile::Resident(image) | Tile::Placeholder(image) => image,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Tile::Placeholder(_))
    }
}

/// Bounded FIFO cache of decoded tiles backed by a [`TileStore`] and a
/// [`TileSource`].
///
/// Cloning is cheap and every clone shares the same cache. The owner (usually
/// the renderer) creates one instance and passes it to whatever needs tiles.
///
/// All methods are synchronous. The only I/O performed on the caller's thread
/// is a single local file read on a memory miss; network fetches run as tokio
/// tasks on the runtime captured at build time.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use osm_tile_cache::io::{HttpTileSource, TileStore, DEFAULT_TILE_URL};
/// use osm_tile_cache::tile::{TileCache, TileFormat};
///
/// let store = Arc::new(TileStore::new("/var/cache/tiles", TileFormat::Png));
/// let source = Arc::new(HttpTileSource::new(DEFAULT_TILE_URL)?);
/// let cache = TileCache::builder(store, source).capacity(16).build()?;
///
/// cache.prefetch(16, 34794, 23137);
/// let tile = cache.get(16, 34794, 23137); // placeholder until the fetch lands
/// ```
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<CacheInner>,
}

impl TileCache {
    /// Start building a cache over the given store and source.
    pub fn builder(store: Arc<TileStore>, source: Arc<dyn TileSource>) -> TileCacheBuilder {
        TileCacheBuilder::new(store, source)
    }

    /// Get the tile at `(zoom, x, y)`, or the placeholder if it is not
    /// available yet. Never waits for the network.
    pub fn get(&self, zoom: u8, x: u32, y: u32) -> TileImage {
        self.get_address(TileAddress::new(zoom, x, y))
    }

    /// [`Self::get`] by address.
    pub fn get_address(&self, address: TileAddress) -> TileImage {
        self.lookup(address).into_image()
    }

    /// Like [`Self::get_address`], but also reports whether the image is
    /// the placeholder. The answer is decided together with the image, so a
    /// concurrent [`Self::clear`] cannot make a placeholder pass for a tile.
    pub fn lookup(&self, address: TileAddress) -> Tile {
        if !address.is_valid() {
            trace!(address = %address, "Address outside tile grid");
            return self.serve_placeholder();
        }

        // Memory
        {
            let state = self.inner.state.lock();
            if let Some(image) = state.tiles.peek(&address) {
                CacheStats::bump(&self.inner.stats.memory_hits);
                return Tile::Resident(Arc::clone(image));
            }
        }

        // Disk
        if let Some(image) = self.load_from_disk(&address) {
            return Tile::Resident(image);
        }

        // Network
        self.dispatch_fetch(address)
    }

    /// Insert or overwrite a tile, evicting the oldest entries beyond capacity.
    ///
    /// Re-inserting an existing address moves it to the back of the
    /// eviction order.
    pub fn put(&self, address: TileAddress, image: TileImage) {
        let mut state = self.inner.state.lock();
        state.tiles.put(address, image);

        while state.tiles.len() > self.inner.capacity {
            match state.tiles.pop_lru() {
                Some((evicted, _image)) => {
                    CacheStats::bump(&self.inner.stats.evictions);
                    trace!(address = %evicted, "Evicted tile");
                }
                None => break,
            }
        }
    }

    /// Request the 3×3 neighbourhood around `(zoom, x, y)`, centre first.
    ///
    /// Tiles already on disk are loaded into memory and missing ones are
    /// dispatched, so the following draw pass finds as much as possible
    /// resident.
    pub fn prefetch(&self, zoom: u8, x: u32, y: u32) {
        for address in TileAddress::new(zoom, x, y).neighborhood() {
            self.get_address(address);
        }
    }

    /// Release every cached image and the placeholder.
    ///
    /// Running fetches are not cancelled and may repopulate the cache.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let released = state.tiles.len();
        state.tiles.clear();
        state.placeholder = None;
        debug!(released, "Cleared tile cache");
    }

    /// Whether `address` is resident in memory. Does not affect eviction order.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.inner.state.lock().tiles.contains(address)
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.inner.state.lock().tiles.len()
    }

    /// Whether no tile is resident.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().tiles.is_empty()
    }

    /// Maximum number of resident tiles.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Resident addresses, next to be evicted first.
    pub fn resident(&self) -> Vec<TileAddress> {
        let state = self.inner.state.lock();
        state.tiles.iter().rev().map(|(address, _)| *address).collect()
    }

    /// Whether a network fetch is running for `address`.
    pub fn is_in_flight(&self, address: &TileAddress) -> bool {
        self.inner.state.lock().in_flight.contains(address)
    }

    /// Number of running network fetches.
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Current placeholder image.
    pub fn placeholder(&self) -> TileImage {
        self.inner.state.lock().placeholder()
    }

    /// The disk store behind this cache.
    pub fn store(&self) -> &Arc<TileStore> {
        &self.inner.store
    }

    /// Snapshot of the hit/miss/fetch counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        let s = &self.inner.stats;
        CacheStatsSnapshot {
            memory_hits: s.memory_hits.load(Ordering::Relaxed),
            disk_hits: s.disk_hits.load(Ordering::Relaxed),
            placeholders_served: s.placeholders_served.load(Ordering::Relaxed),
            fetches_dispatched: s.fetches_dispatched.load(Ordering::Relaxed),
            fetches_succeeded: s.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: s.fetches_failed.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
            corrupt_files: s.corrupt_files.load(Ordering::Relaxed),
        }
    }

    /// Wait until no fetch is in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.in_flight_count() == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn serve_placeholder(&self) -> Tile {
        CacheStats::bump(&self.inner.stats.placeholders_served);
        Tile::Placeholder(self.inner.state.lock().placeholder())
    }

    fn load_from_disk(&self, address: &TileAddress) -> Option<TileImage> {
        let data = match self.inner.store.read(address) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to read tile from disk");
                return None;
            }
        };

        match codec::decode(&data) {
            Ok(image) => {
                let image: TileImage = Arc::new(image);
                self.put(*address, Arc::clone(&image));
                CacheStats::bump(&self.inner.stats.disk_hits);
                Some(image)
            }
            Err(e) => {
                debug!(address = %address, error = %e, "Corrupt tile on disk");
                CacheStats::bump(&self.inner.stats.corrupt_files);
                self.inner.store.remove_corrupt(address);
                None
            }
        }
    }

    fn dispatch_fetch(&self, address: TileAddress) -> Tile {
        // Host code; must not run under the state lock
        let online = self.inner.connectivity.is_online();

        let mut state = self.inner.state.lock();

        // A fetch may have landed while the lock was released for the disk read
        if let Some(image) = state.tiles.peek(&address) {
            CacheStats::bump(&self.inner.stats.memory_hits);
            return Tile::Resident(Arc::clone(image));
        }

        CacheStats::bump(&self.inner.stats.placeholders_served);
        let placeholder = Tile::Placeholder(state.placeholder());

        if state.in_flight.contains(&address) || !online {
            return placeholder;
        }

        state.in_flight.insert(address);
        drop(state);

        CacheStats::bump(&self.inner.stats.fetches_dispatched);
        debug!(address = %address, "Dispatching tile fetch");

        let guard = InFlightGuard::new(self.clone(), address);
        self.inner
            .fetcher
            .dispatch(&self.inner.runtime, self.clone(), address, guard);

        placeholder
    }

    pub(crate) fn finish_in_flight(&self, address: &TileAddress) {
        self.inner.state.lock().in_flight.remove(address);
    }

    pub(crate) fn record_fetch_success(&self) {
        CacheStats::bump(&self.inner.stats.fetches_succeeded);
    }

    pub(crate) fn record_fetch_failure(&self) {
        CacheStats::bump(&self.inner.stats.fetches_failed);
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.inner.capacity)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`TileCache`].
pub struct TileCacheBuilder {
    store: Arc<TileStore>,
    source: Arc<dyn TileSource>,
    capacity: usize,
    placeholder: Option<TileImage>,
    connectivity: Option<Arc<dyn Connectivity>>,
    runtime: Option<Handle>,
    jpeg_quality: u8,
}

impl TileCacheBuilder {
    fn new(store: Arc<TileStore>, source: Arc<dyn TileSource>) -> Self {
        Self {
            store,
            source,
            capacity: DEFAULT_MEMORY_CAPACITY,
            placeholder: None,
            connectivity: None,
            runtime: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Maximum number of decoded tiles kept in memory.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Image returned while a tile is unavailable. Defaults to a transparent
    /// 256×256 tile.
    pub fn placeholder(mut self, placeholder: TileImage) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Network availability check. Defaults to always online.
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Runtime that runs background fetches. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// JPEG quality for tiles re-encoded before hitting the disk.
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn build(self) -> Result<TileCache, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| ConfigError::NoRuntime(e.to_string()))?,
        };

        let fetcher = TileFetcher::new(self.source, Arc::clone(&self.store))
            .with_jpeg_quality(self.jpeg_quality);

        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityFlag::online()));

        Ok(TileCache {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    tiles: LruCache::unbounded(),
                    in_flight: HashSet::new(),
                    placeholder: Some(self.placeholder.unwrap_or_else(|| blank_tile(TILE_SIZE))),
                }),
                capacity: self.capacity,
                store: self.store,
                fetcher,
                connectivity,
                runtime,
                stats: CacheStats::default(),
            }),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
