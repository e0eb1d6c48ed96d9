//! Disk store behaviour seen through the cache and the seeder.
//!
//! Tests verify:
//! - Files land at `{zoom}/{x}/{y}.png` under the store root
//! - Corrupt files are deleted and re-fetched
//! - Seeded areas are served offline without network access

use std::sync::Arc;

use osm_tile_cache::io::{ConnectivityFlag, TileStore};
use osm_tile_cache::tile::{seed, SeedRequest, TileAddress, TileFetcher, TileFormat};

use super::test_utils::{is_placeholder, is_tile_for, tile_png, MockTileSource, TestCache};

#[tokio::test]
async fn test_store_layout() {
    let fixture = TestCache::new(MockTileSource::new());

    fixture.cache.get(5, 3, 7);
    fixture.settle().await;

    let path = fixture.dir.path().join("5").join("3").join("7.png");
    assert!(path.is_file());
    assert_eq!(path, fixture.store.path_for(&TileAddress::new(5, 3, 7)));
}

#[tokio::test]
async fn test_preexisting_file_served_without_network() {
    let fixture = TestCache::new(MockTileSource::new());
    let address = TileAddress::new(9, 270, 180);
    fixture.store.write(&address, &tile_png(&address)).unwrap();

    let tile = fixture.cache.get_address(address);

    assert!(is_tile_for(&tile, &address));
    assert_eq!(fixture.source.request_count(), 0);
}

#[tokio::test]
async fn test_corrupt_file_replaced() {
    let fixture = TestCache::new(MockTileSource::new());
    let address = TileAddress::new(5, 3, 7);
    fixture.store.write(&address, b"not an image").unwrap();

    let tile = fixture.cache.get_address(address);
    assert!(is_placeholder(&fixture.cache, &tile));
    assert_eq!(fixture.cache.stats().corrupt_files, 1);

    fixture.settle().await;

    // The re-fetched tile overwrote the corrupt file
    let data = fixture.store.read(&address).unwrap().unwrap();
    assert_eq!(data, tile_png(&address));
    assert_eq!(fixture.source.request_count(), 1);
    assert!(fixture.store.pending_deletions().is_empty());
}

#[tokio::test]
async fn test_seeded_area_available_offline() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TileStore::new(dir.path(), TileFormat::Png));
    let source = MockTileSource::new();

    let fetcher = TileFetcher::new(Arc::new(source.clone()), Arc::clone(&store));
    let request = SeedRequest::new(11.0, 46.5, 11.3, 46.7, vec![8, 9]);
    let report = seed(&fetcher, &request).await.unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.fetched, report.requested);
    assert_eq!(source.request_count(), report.requested);

    let cache = osm_tile_cache::TileCache::builder(Arc::clone(&store), Arc::new(source.clone()))
        .connectivity(Arc::new(ConnectivityFlag::offline()))
        .build()
        .unwrap();

    let address = TileAddress::containing(46.6, 11.1, 9).unwrap();
    let tile = cache.get_address(address);
    assert!(is_tile_for(&tile, &address));
    assert_eq!(source.request_count(), report.requested);
}
