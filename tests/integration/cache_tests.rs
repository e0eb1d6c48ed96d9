//! Cache behaviour through the public API.
//!
//! Tests verify:
//! - Network tiles land in memory and on disk
//! - Concurrent callers never trigger duplicate fetches
//! - Offline mode serves memory and disk only
//! - Prefetch covers the clamped 3×3 neighbourhood

use std::sync::{Arc, Barrier};
use std::thread;

use osm_tile_cache::io::ConnectivityFlag;
use osm_tile_cache::tile::TileAddress;

use super::test_utils::{is_placeholder, is_tile_for, MockTileSource, TestCache};

// =============================================================================
// Resolution Order
// =============================================================================

#[tokio::test]
async fn test_miss_then_hit() {
    let fixture = TestCache::new(MockTileSource::new());
    let address = TileAddress::new(5, 3, 7);

    let first = fixture.cache.get(5, 3, 7);
    assert!(is_placeholder(&fixture.cache, &first));

    fixture.settle().await;

    let second = fixture.cache.get(5, 3, 7);
    assert!(!is_placeholder(&fixture.cache, &second));
    assert!(is_tile_for(&second, &address));
    assert!(fixture.store.contains(&address));

    // Resident: same image, no further I/O
    let third = fixture.cache.get(5, 3, 7);
    assert!(Arc::ptr_eq(&second, &third));
    assert_eq!(fixture.source.request_count(), 1);
    assert_eq!(fixture.cache.stats().memory_hits, 2);
}

#[tokio::test]
async fn test_disk_survives_memory_purge() {
    let fixture = TestCache::new(MockTileSource::new());
    let address = TileAddress::new(12, 2200, 1400);

    fixture.cache.get_address(address);
    fixture.settle().await;
    fixture.cache.clear();
    assert!(!fixture.cache.contains(&address));

    let tile = fixture.cache.get_address(address);
    assert!(is_tile_for(&tile, &address));
    assert_eq!(fixture.source.request_count(), 1);
    assert_eq!(fixture.cache.stats().disk_hits, 1);
}

#[tokio::test]
async fn test_failed_fetch_is_retried_on_next_get() {
    let source = MockTileSource::new();
    let address = TileAddress::new(3, 1, 1);
    source.fail(address);
    let fixture = TestCache::new(source);

    fixture.cache.get_address(address);
    fixture.settle().await;

    assert!(!fixture.cache.contains(&address));
    assert!(!fixture.cache.is_in_flight(&address));
    assert!(!fixture.store.contains(&address));
    assert_eq!(fixture.cache.stats().fetches_failed, 1);

    // Nothing remembers the failure
    fixture.cache.get_address(address);
    fixture.settle().await;
    assert_eq!(fixture.source.request_count(), 2);
}

// =============================================================================
// De-duplication
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_dispatch_once() {
    let source = MockTileSource::gated();
    let fixture = TestCache::new(source.clone());
    let address = TileAddress::new(5, 3, 7);

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let cache = fixture.cache.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.lookup(address).is_placeholder()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap(), "every caller gets the placeholder");
    }

    assert!(fixture.cache.is_in_flight(&address));
    assert_eq!(fixture.cache.in_flight_count(), 1);
    assert_eq!(fixture.cache.stats().fetches_dispatched, 1);

    source.release(1);
    fixture.settle().await;

    assert_eq!(source.request_count(), 1);
    assert!(is_tile_for(&fixture.cache.get(5, 3, 7), &address));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lookup_reports_placeholder_while_clear_runs() {
    let fixture = TestCache::new(MockTileSource::new());
    fixture.connectivity.set(false);
    let address = TileAddress::new(5, 3, 7);

    let rounds = 2_000;
    let clearer = {
        let cache = fixture.cache.clone();
        thread::spawn(move || {
            for _ in 0..rounds {
                cache.clear();
            }
        })
    };

    // clear() swaps the placeholder out; the answer must still say which it was
    for _ in 0..rounds {
        let tile = fixture.cache.lookup(address);
        assert!(tile.is_placeholder());
        assert_eq!(tile.image().width(), 256);
    }

    clearer.join().unwrap();
    assert_eq!(fixture.source.request_count(), 0);
}

#[tokio::test]
async fn test_held_fetch_blocks_redispatch() {
    let source = MockTileSource::gated();
    let fixture = TestCache::new(source.clone());

    for _ in 0..5 {
        fixture.cache.get(8, 100, 90);
        tokio::task::yield_now().await;
    }
    assert_eq!(fixture.cache.stats().fetches_dispatched, 1);

    source.release(1);
    fixture.settle().await;
    assert_eq!(source.request_count(), 1);
}

// =============================================================================
// Offline
// =============================================================================

#[tokio::test]
async fn test_offline_returns_placeholder_without_dispatch() {
    let fixture = TestCache::new(MockTileSource::new());
    fixture.connectivity.set(false);

    let tile = fixture.cache.get(5, 3, 7);

    assert!(is_placeholder(&fixture.cache, &tile));
    assert_eq!(fixture.cache.in_flight_count(), 0);
    assert_eq!(fixture.source.request_count(), 0);
    assert!(fixture.cache.is_empty());
}

#[tokio::test]
async fn test_offline_still_serves_disk() {
    let fixture = TestCache::new(MockTileSource::new());
    let address = TileAddress::new(10, 545, 361);

    fixture.cache.get_address(address);
    fixture.settle().await;

    let offline = fixture.fresh_cache(Arc::new(ConnectivityFlag::offline()));
    let tile = offline.get_address(address);

    assert!(is_tile_for(&tile, &address));
    assert!(offline.contains(&address));
    assert_eq!(fixture.source.request_count(), 1);
}

#[tokio::test]
async fn test_connectivity_restored() {
    let fixture = TestCache::new(MockTileSource::new());
    fixture.connectivity.set(false);

    fixture.cache.get(4, 8, 5);
    assert_eq!(fixture.source.request_count(), 0);

    fixture.connectivity.set(true);
    fixture.cache.get(4, 8, 5);
    fixture.settle().await;
    assert_eq!(fixture.source.request_count(), 1);
}

// =============================================================================
// Prefetch and Eviction
// =============================================================================

#[tokio::test]
async fn test_prefetch_corner_tile() {
    let fixture = TestCache::new(MockTileSource::new());

    fixture.cache.prefetch(3, 0, 0);
    fixture.settle().await;

    let mut requested = fixture.source.requests();
    requested.sort();
    assert_eq!(
        requested,
        vec![
            TileAddress::new(3, 0, 0),
            TileAddress::new(3, 0, 1),
            TileAddress::new(3, 1, 0),
            TileAddress::new(3, 1, 1),
        ]
    );
    assert_eq!(fixture.cache.len(), 4);
}

#[tokio::test]
async fn test_new_view_evicts_previous_view() {
    let fixture = TestCache::with_capacity(MockTileSource::new(), 9);

    fixture.cache.prefetch(6, 10, 20);
    fixture.settle().await;
    assert_eq!(fixture.cache.len(), 9);

    fixture.cache.prefetch(6, 40, 20);
    fixture.settle().await;

    let mut resident = fixture.cache.resident();
    resident.sort();
    let mut expected = TileAddress::new(6, 40, 20).neighborhood();
    expected.sort();
    assert_eq!(resident, expected);
    assert_eq!(fixture.cache.stats().evictions, 9);

    // The old view is still on disk
    assert!(fixture.store.contains(&TileAddress::new(6, 10, 20)));
}
