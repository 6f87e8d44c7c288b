use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use oplog::client::{ClientError, Transport};
use oplog::config::{Authentication, Config, Profiles};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub const APP: &str = "deploy";
pub const APP_KEY: &str = "s3cret";

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("Failed to create in-memory SQLite pool");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            secure_cookies: false,
            profiles: [(APP.to_string(), APP_KEY.to_string())].into_iter().collect::<Profiles>(),
            authentication: Authentication::Development,
        };
        let router = oplog::build_app(pool.clone(), &config, oplog::auth::authenticator(&config.authentication))
            .await
            .expect("Failed to build app");

        Self { router, db: pool }
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .unwrap()
    }

    /// Log in as the given user (the development authenticator wants the
    /// username as password) and return the session cookie string.
    pub async fn login(&self, username: &str) -> String {
        let resp = self
            .post_form("/login", &format!("username={username}&password={username}"), None)
            .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        resp.headers()
            .get("set-cookie")
            .expect("Login should set a session cookie")
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    /// Send a GET request with an optional session cookie.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    /// Send a POST form request with an optional session cookie.
    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.request(req).await
    }

    /// POST a raw body to an API url and return the status and decoded JSON.
    pub async fn post_api(&self, uri: &str, body: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        let resp = self.request(req).await;
        let status = resp.status();
        let body = body_string(resp).await;
        (status, serde_json::from_str(&body).expect("API responses are JSON"))
    }

    /// Call the API as the holder of `cookie`.
    pub async fn rpc(&self, request: Value, cookie: &str) -> (StatusCode, Value) {
        self.post_api("/api", &request.to_string(), Some(cookie)).await
    }

    /// A client transport that talks to this app in-process.
    pub fn transport(&self, cookie: &str) -> Arc<RouterTransport> {
        Arc::new(RouterTransport {
            router: self.router.clone(),
            uri: "/api".to_string(),
            cookie: Some(cookie.to_string()),
        })
    }

    pub fn application_transport(&self) -> Arc<RouterTransport> {
        Arc::new(RouterTransport {
            router: self.router.clone(),
            uri: format!("/api?app={APP}&key={APP_KEY}"),
            cookie: None,
        })
    }
}

/// Drives the client library against the router without a socket.
pub struct RouterTransport {
    router: Router,
    uri: String,
    cookie: Option<String>,
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, request: Value) -> Result<Value, ClientError> {
        let mut builder = Request::builder()
            .uri(&self.uri)
            .method("POST")
            .header("content-type", "application/json");
        if let Some(cookie) = &self.cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder
            .body(Body::from(request.to_string()))
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let resp = tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_bytes();
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Read the full response body as a String.
pub async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Assert that a response is a redirect to the given location.
pub fn assert_redirect(resp: &Response, expected_location: &str) {
    assert!(
        resp.status().is_redirection(),
        "Expected redirect, got {}",
        resp.status()
    );
    let location = resp
        .headers()
        .get("location")
        .expect("Redirect should have location header")
        .to_str()
        .unwrap();
    assert_eq!(location, expected_location);
}
