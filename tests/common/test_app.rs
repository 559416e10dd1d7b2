//! Test application setup utilities
//!
//! Builds the real `/api` router over a temporary SQLite database, with
//! rate limiting disabled and a mailer that only records messages.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;

use medsas::{
    api, config::AppConfig, db, middleware::auth::create_access_token, models::User,
    services::LogMailer, AppState,
};

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<LogMailer>,
}

impl TestApp {
    /// Create a new test application with a fresh database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let mailer = Arc::new(LogMailer::new());
        let state = AppState::new(config, db, mailer.clone());
        let router = api::router(state.clone());

        Self {
            router,
            state,
            mailer,
        }
    }

    /// Bearer token for a seeded user
    pub fn token_for(&self, user: &User) -> String {
        create_access_token(
            user,
            &self.state.config.auth.jwt_secret,
            self.state.config.auth.token_expiry_hours,
        )
        .expect("Failed to create test token")
    }

    /// Number of rows currently in `table`
    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.state.db)
            .await
            .expect("Failed to count rows")
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Make a PUT request with JSON body
    pub async fn put_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> TestResponse {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    /// Make a DELETE request, optionally with a JSON body
    pub async fn delete(
        &self,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        self.send(Method::DELETE, uri, token, body).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.request(request).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Verification token from the last verification mail sent to `email`
    pub fn verification_token_for(&self, email: &str) -> String {
        let mail = self
            .mailer
            .sent()
            .into_iter()
            .rev()
            .find(|m| m.to == email && m.subject.contains("Verify"))
            .expect("No verification mail sent");
        let start = mail.body.find("token=").expect("No token in mail") + "token=".len();
        mail.body[start..]
            .split_whitespace()
            .next()
            .expect("Empty token")
            .to_string()
    }

    /// Subjects of every mail sent to `email`
    pub fn mail_subjects(&self, email: &str) -> Vec<String> {
        self.mailer
            .sent()
            .into_iter()
            .filter(|m| m.to == email)
            .map(|m| m.subject)
            .collect()
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_created(&self) -> &Self {
        self.assert_status(StatusCode::CREATED)
    }

    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_conflict(&self) -> &Self {
        self.assert_status(StatusCode::CONFLICT)
    }
}

/// Create a test configuration with temporary SQLite database
pub fn test_config() -> AppConfig {
    // Use a unique temp file for each test to avoid conflicts
    let db_path = std::env::temp_dir().join(format!("medsas_test_{}.db", Uuid::new_v4().simple()));

    let mut config = AppConfig::default();
    config.server.port = 3000;
    config.database.url = format!("sqlite://{}?mode=rwc", db_path.display());
    config.database.max_connections = 2;
    config.auth.jwt_secret = "test_secret_key_that_is_at_least_32_bytes_long".to_string();
    config.auth.cookie_secure = false;
    config.rate_limit.enabled = false;
    config.trial.sweep_interval_secs = 0;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = TestApp::new().await;
        let response = app.get("/api/health", None).await;
        response.assert_ok();
        let json: serde_json::Value = response.json();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_pings_database() {
        let app = TestApp::new().await;
        app.get("/api/health/ready", None).await.assert_ok();
    }

    #[tokio::test]
    async fn test_api_responses_are_marked_no_store() {
        let app = TestApp::new().await;
        let response = app.get("/api/health", None).await;
        assert_eq!(
            response.headers.get("cache-control").unwrap(),
            "no-store, private"
        );
    }
}
