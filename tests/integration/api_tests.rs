//! API integration tests for the HTTP front end.
//!
//! Tests verify:
//! - Tile responses for missing and resident tiles
//! - Locate, clear and health endpoints
//! - Error responses and headers

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use osm_tile_cache::tile::{decode, TileAddress};
use osm_tile_cache::{create_router, RouterConfig};

use super::test_utils::{is_valid_png, tile_color, MockTileSource, TestCache};

fn router(fixture: &TestCache, config: RouterConfig) -> Router {
    create_router(fixture.cache.clone(), config.with_tracing(false))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header("origin", origin)
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_missing_tile_serves_placeholder() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new().with_prefetch(false));

    let response = router.oneshot(get("/tiles/5/3/7.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(response.headers().get("x-tile-placeholder").unwrap(), "true");
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_png(&body));
}

#[tokio::test]
async fn test_tile_served_after_fetch_lands() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new().with_prefetch(false));
    let address = TileAddress::new(5, 3, 7);

    router.clone().oneshot(get("/tiles/5/3/7.png")).await.unwrap();
    fixture.settle().await;

    let response = router.oneshot(get("/tiles/5/3/7.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-placeholder").unwrap(), "false");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let image = decode(&body).unwrap();
    assert_eq!(*image.to_rgb8().get_pixel(10, 10), tile_color(&address));
    assert_eq!(fixture.source.request_count(), 1);
}

#[tokio::test]
async fn test_tile_without_extension() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new().with_prefetch(false));

    let response = router.oneshot(get("/tiles/5/3/7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    fixture.settle().await;
    assert!(fixture.cache.contains(&TileAddress::new(5, 3, 7)));
}

#[tokio::test]
async fn test_tile_request_prefetches_neighbourhood() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    router.oneshot(get("/tiles/5/3/7.png")).await.unwrap();
    fixture.settle().await;

    assert_eq!(fixture.source.request_count(), 9);
    assert_eq!(fixture.cache.len(), 9);
}

#[tokio::test]
async fn test_tile_outside_grid_is_placeholder_without_fetch() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router.oneshot(get("/tiles/1/5/0.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-placeholder").unwrap(), "true");
    fixture.settle().await;
    assert_eq!(fixture.source.request_count(), 0);
}

#[tokio::test]
async fn test_invalid_tile_row_rejected() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router.oneshot(get("/tiles/5/3/seven.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_tile_path");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_offline_tile_request() {
    let fixture = TestCache::new(MockTileSource::new());
    fixture.connectivity.set(false);
    let router = router(&fixture, RouterConfig::new());

    let response = router.oneshot(get("/tiles/5/3/7.png")).await.unwrap();

    assert_eq!(response.headers().get("x-tile-placeholder").unwrap(), "true");
    assert_eq!(fixture.cache.in_flight_count(), 0);
    assert_eq!(fixture.source.request_count(), 0);
}

// =============================================================================
// Locate
// =============================================================================

#[tokio::test]
async fn test_locate() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router
        .oneshot(get("/locate?lat=46.674&lon=11.132&zoom=16"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["zoom"], 16);
    assert_eq!(json["x"], 34794);
    assert_eq!(json["y"], 23137);
    assert_eq!(json["key"], "/16/34794/23137");
    assert!(json["bounds"]["north"].as_f64().unwrap() >= 46.674);
    assert!(json["bounds"]["south"].as_f64().unwrap() <= 46.674);
}

#[tokio::test]
async fn test_locate_invalid_latitude() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router
        .oneshot(get("/locate?lat=89.5&lon=0&zoom=3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_position");
}

// =============================================================================
// Cache Management and Health
// =============================================================================

#[tokio::test]
async fn test_clear_endpoint() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    router.clone().oneshot(get("/tiles/5/3/7.png")).await.unwrap();
    fixture.settle().await;
    assert!(!fixture.cache.is_empty());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/cache/clear")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(fixture.cache.is_empty());
}

#[tokio::test]
async fn test_clear_requires_post() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router.oneshot(get("/cache/clear")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new().with_prefetch(false));

    router.clone().oneshot(get("/tiles/2/1/1.png")).await.unwrap();
    fixture.settle().await;

    let response = router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["resident_tiles"], 1);
    assert_eq!(json["in_flight"], 0);
    assert_eq!(json["cache"]["fetches_succeeded"], 1);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_preflight_any_origin() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new());

    let response = router
        .oneshot(preflight("/tiles/5/3/7.png", "https://maps.example.org"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
    let methods = headers
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("GET"));
    assert!(methods.contains("POST"));
    assert_eq!(fixture.source.request_count(), 0);
}

#[tokio::test]
async fn test_cors_preflight_listed_origins() {
    let fixture = TestCache::new(MockTileSource::new());
    let config = RouterConfig::new().with_cors_origins(vec![
        "https://example.com".to_string(),
        "not a header\n".to_string(),
    ]);

    let allowed = router(&fixture, config.clone())
        .oneshot(preflight("/tiles/5/3/7.png", "https://example.com"))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").unwrap(),
        "https://example.com"
    );

    let denied = router(&fixture, config)
        .oneshot(preflight("/tiles/5/3/7.png", "https://other.example"))
        .await
        .unwrap();
    assert!(denied.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_cors_disabled_with_empty_origin_list() {
    let fixture = TestCache::new(MockTileSource::new());
    let router = router(&fixture, RouterConfig::new().with_cors_origins(vec![]));

    let response = router
        .oneshot(preflight("/health", "https://example.com"))
        .await
        .unwrap();

    assert!(response.headers().get("access-control-allow-origin").is_none());
}
