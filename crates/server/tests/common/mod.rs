//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real SQLite store and mock feed, scraper and push service.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use threadwatch_core::{
    config::{Config, DatabaseConfig, ImageCacheConfig},
    store::{settings, TrackingStore},
    testing::{MockFeedSource, MockImageCache, MockNotifier, MockScraper},
    ChangeDetector, SqliteTrackingStore, SyncOrchestrator,
};
use threadwatch_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use threadwatch_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_add_work() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post(&fixture.path("/tracking"), json!({
///         "url": "https://forum.example/threads/eternum.4242/"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
#[allow(dead_code)]
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub store: Arc<SqliteTrackingStore>,
    /// Mock feed - configure lookup and search results
    pub feed: Arc<MockFeedSource>,
    pub scraper: Arc<MockScraper>,
    /// Mock push service - inspect sent notifications
    pub notifier: Arc<MockNotifier>,
    /// Id of the primary admin
    pub user_id: i64,
    /// Temporary directory for the database and image cache
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[allow(dead_code)]
impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let image_dir = temp_dir.path().join("images");
        std::fs::create_dir_all(&image_dir).expect("Failed to create image dir");
        std::fs::write(image_dir.join("cover.jpg"), b"jpeg").expect("Failed to write image");

        let config = Config {
            database: DatabaseConfig { path: db_path.clone() },
            image_cache: ImageCacheConfig {
                dir: image_dir,
                web_prefix: "/images".to_string(),
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteTrackingStore::new(&db_path).expect("Failed to create store"));
        let admin = store.create_user("admin", "hash", true).expect("Failed to create admin");
        store
            .set_setting(admin.id, settings::PUSHOVER_USER_KEY, "ukey")
            .unwrap();
        store
            .set_setting(admin.id, settings::PUSHOVER_API_TOKEN, "token")
            .unwrap();

        let feed = Arc::new(MockFeedSource::new());
        let scraper = Arc::new(MockScraper::new());
        let notifier = Arc::new(MockNotifier::new());
        let detector = Arc::new(ChangeDetector::new(
            store.clone(),
            feed.clone(),
            scraper.clone(),
            Arc::new(MockImageCache::new()),
            notifier.clone(),
            config.detector.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            detector,
            feed.clone(),
            scraper.clone(),
            notifier.clone(),
            config.sync.clone(),
            &config.detector,
        ));

        let state = Arc::new(AppState::new(config, orchestrator));
        let router = create_router(state);

        Self {
            router,
            store,
            feed,
            scraper,
            notifier,
            user_id: admin.id,
            temp_dir,
        }
    }

    /// `/api/v1/users/{user_id}` followed by `suffix`.
    pub fn path(&self, suffix: &str) -> String {
        format!("/api/v1/users/{}{}", self.user_id, suffix)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
