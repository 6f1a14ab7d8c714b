//! `TetherServer`: Axum router, listeners and shared state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tether_auth::TokenIssuer;
use tether_core::CredentialStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::login::login_handler;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ws_handler;
use crate::websocket::handshake::SessionGateway;
use crate::websocket::observer::{LifecycleObserver, TracingObserver};
use crate::websocket::registry::ConnectionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handshake driver; also owns the registry, issuer and store.
    pub gateway: SessionGateway,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Open `WebSocket` transports.
    pub live_channels: Arc<AtomicUsize>,
    /// Cancelled on shutdown; socket pumps send a going-away close.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle; `/metrics` is 404 without one.
    pub metrics: Option<PrometheusHandle>,
}

/// The session server.
pub struct TetherServer {
    config: Arc<ServerConfig>,
    gateway: SessionGateway,
    shutdown: Arc<ShutdownCoordinator>,
    live_channels: Arc<AtomicUsize>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl TetherServer {
    /// Create a server that logs lifecycle events through `tracing`.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn CredentialStore>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self::with_observer(config, store, issuer, Arc::new(TracingObserver))
    }

    /// Create a server with a custom lifecycle observer.
    pub fn with_observer(
        config: ServerConfig,
        store: Arc<dyn CredentialStore>,
        issuer: Arc<TokenIssuer>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        let gateway = SessionGateway::new(
            Arc::new(ConnectionRegistry::new()),
            issuer,
            store,
            observer,
        )
        .with_close_reason_on_reject(config.close_reason_on_reject);

        Self {
            config: Arc::new(config),
            gateway,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            live_channels: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self) -> AppState {
        AppState {
            gateway: self.gateway.clone(),
            config: Arc::clone(&self.config),
            live_channels: Arc::clone(&self.live_channels),
            shutdown: self.shutdown.token(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the API router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/api/login", post(login_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(cors_layer(self.config.cors_origin.as_ref()))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state())
    }

    /// Bind the API listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        let addr = self.config.bind_addr();
        let listener = bind(&addr).await?;
        let local = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        self.spawn_serve("api", listener, self.router());
        info!(addr = %local, "api listening");
        Ok(local)
    }

    /// Bind the static login page listener, if a directory is configured.
    pub async fn listen_static(&self) -> Result<Option<SocketAddr>, ServerError> {
        let Some(dir) = self.config.static_dir.as_ref() else {
            return Ok(None);
        };
        let addr = format!("{}:{}", self.config.host, self.config.static_port);
        let listener = bind(&addr).await?;
        let local = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let router = Router::new()
            .fallback_service(ServeDir::new(dir))
            .layer(TraceLayer::new_for_http());
        self.spawn_serve("static", listener, router);
        info!(addr = %local, dir = %dir.display(), "static page listening");
        Ok(Some(local))
    }

    fn spawn_serve(&self, name: &'static str, listener: TcpListener, router: Router) {
        let token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(listener = name, error = %e, "server exited with error");
            }
        }));
    }

    /// Handshake driver.
    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    /// Identity registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.gateway.registry()
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open `WebSocket` transports.
    pub fn live_channels(&self) -> usize {
        self.live_channels.load(Ordering::Relaxed)
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_owned(),
            source,
        })
}

fn cors_layer(origin: Option<&HeaderValue>) -> CorsLayer {
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.clone())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.live_channels.load(Ordering::Relaxed),
        state.gateway.registry().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tether_core::{Account, CredentialError, Identity};
    use tether_store::{Database, NewAccount, SqliteCredentialStore};
    use tower::ServiceExt;

    const SECRET: &[u8] = b"server-test-secret";

    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn find_by_credentials(
            &self,
            _identity: &Identity,
            _secret: &str,
        ) -> Result<Option<Account>, CredentialError> {
            Err(CredentialError::Unavailable("db down".into()))
        }

        async fn find_by_identity(
            &self,
            _identity: &Identity,
        ) -> Result<Option<Account>, CredentialError> {
            Err(CredentialError::Unavailable("db down".into()))
        }
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(SECRET, Duration::from_secs(3600)))
    }

    fn make_server_with(config: ServerConfig) -> TetherServer {
        let store = SqliteCredentialStore::new(Database::in_memory().unwrap());
        let _ = store
            .repo()
            .insert(&NewAccount {
                email: "alice@example.com".into(),
                password: "s3cret".into(),
                name: "Alice".into(),
                role: "admin".into(),
            })
            .unwrap();
        TetherServer::new(config, Arc::new(store), issuer())
    }

    fn make_server() -> TetherServer {
        make_server_with(ServerConfig::default())
    }

    fn login_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/login")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // ── Routes ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["authenticated"], 0);
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        for uri in ["/ws", "/"] {
            let app = make_server().router();
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = app.oneshot(req).await.unwrap();
            assert!(resp.status().is_client_error(), "{uri}: {}", resp.status());
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_disabled_without_handle() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_rendered_with_handle() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let app = make_server().with_metrics(handle).router();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // ── Login ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_success_returns_verifiable_token() {
        let server = make_server();
        let app = server.router();
        let resp = app
            .oneshot(login_request(
                r#"{"email":"alice@example.com","password":"s3cret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        let token = parsed["token"].as_str().unwrap();
        let identity = server.gateway().issuer().verify(token).unwrap();
        assert_eq!(identity.as_str(), "alice@example.com");
    }

    #[tokio::test]
    async fn login_wrong_password_is_401() {
        let app = make_server().router();
        let resp = app
            .oneshot(login_request(
                r#"{"email":"alice@example.com","password":"nope"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "Invalid credentials"})
        );
    }

    #[tokio::test]
    async fn login_unknown_identity_is_401() {
        let app = make_server().router();
        let resp = app
            .oneshot(login_request(r#"{"email":"bob@example.com","password":"s3cret"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_missing_fields_is_401() {
        let app = make_server().router();
        let resp = app.oneshot(login_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_without_json_content_type_is_401() {
        let app = make_server().router();
        let req = Request::builder()
            .method("POST")
            .uri("/api/login")
            .body(Body::from(
                r#"{"email":"alice@example.com","password":"s3cret"}"#,
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "Invalid credentials"})
        );
    }

    #[tokio::test]
    async fn login_malformed_json_is_401() {
        let app = make_server().router();
        let resp = app.oneshot(login_request("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "Invalid credentials"})
        );
    }

    #[tokio::test]
    async fn login_store_failure_is_500() {
        let server = TetherServer::new(ServerConfig::default(), Arc::new(BrokenStore), issuer());
        let resp = server
            .router()
            .oneshot(login_request(
                r#"{"email":"alice@example.com","password":"s3cret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "Server error"})
        );
    }

    // ── CORS ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cors_restricted_to_configured_origin() {
        let config = ServerConfig {
            cors_origin: Some(HeaderValue::from_static("http://login.example:8204")),
            ..ServerConfig::default()
        };
        let app = make_server_with(config).router();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/login")
            .header("origin", "http://login.example:8204")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://login.example:8204"
        );
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn cors_permissive_by_default() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://anywhere.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    // ── Listeners ────────────────────────────────────────────────────

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let server = make_server();
        let addr = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server
            .shutdown()
            .graceful_shutdown(Some(Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn listen_static_skipped_without_dir() {
        let server = make_server();
        assert!(server.listen_static().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listen_static_serves_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>login</h1>").unwrap();
        let config = ServerConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let server = make_server_with(config);
        let addr = server.listen_static().await.unwrap().unwrap();

        let body = reqwest::get(format!("http://{addr}/index.html"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "<h1>login</h1>");
        server.shutdown().shutdown();
    }

    #[tokio::test]
    async fn bind_failure_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            port: taken.local_addr().unwrap().port(),
            ..ServerConfig::default()
        };
        let server = make_server_with(config);
        assert!(matches!(
            server.listen().await,
            Err(ServerError::Bind { .. })
        ));
    }
}
