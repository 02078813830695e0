//! HTTP API Server
//!
//! REST API for peer existence checks, peer add/remove and address
//! allocation. Routes are served at the root and again under `/api`.

use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::allocator::Subnet;
use crate::config::ApiConfig;
use crate::directory::{PeerDirectory, RemoveOutcome};
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Peer directory over the managed interface
    pub directory: Arc<PeerDirectory>,
    /// Answer 404 instead of 200 when removing an unknown peer
    pub strict_remove: bool,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, directory: Arc<PeerDirectory>) -> Self {
        let state = Arc::new(AppState {
            directory,
            strict_remove: config.strict_remove,
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(peer_routes())
            .nest("/api", peer_routes())
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the HTTP server and run until Ctrl+C
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!(
            "WireGuard API listening at http://{} (interface {})",
            self.config.bind_address,
            self.state.directory.interface_name()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        tracing::info!("HTTP API stopped");
        Ok(())
    }
}

fn peer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/peer", axum::routing::post(handle_add_peer))
        .route("/peer/:public_key", get(handle_check_peer).delete(handle_remove_peer))
        .route("/peers", get(handle_list_peers))
        .route("/available-ip", get(handle_available_ip))
        .route("/health", get(handle_health))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl+C received, shutting down");
}

// ============ Request/Response Types ============

/// Add peer request
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPeerRequest {
    pub public_key: String,
    /// Allocated from the default subnet when absent
    #[serde(rename = "allowedIPs", default)]
    pub allowed_ips: Option<String>,
}

/// Available IP query
#[derive(Debug, Deserialize)]
pub struct AvailableIpQuery {
    pub subnet: Option<String>,
}

/// Message response, used for both success and failure
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    /// Diagnostic text from the failed external call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "allowedIPs", skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<String>,
}

/// Available IP response
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableIpResponse {
    #[serde(rename = "availableIP")]
    pub available_ip: String,
}

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub interface: String,
    pub default_subnet: String,
}

fn message(status: StatusCode, text: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: text.to_string(),
            error: None,
            allowed_ips: None,
        }),
    ).into_response()
}

/// Map a directory error onto a response. `context` describes the operation
/// that failed and becomes the message of 500 responses.
fn error_response(context: &str, err: &Error) -> Response {
    match err {
        Error::PeerAlreadyExists(_) => message(StatusCode::BAD_REQUEST, "Peer already exists."),
        Error::PeerNotFound(_) => message(StatusCode::NOT_FOUND, "Peer not found."),
        Error::InvalidRequest(_) | Error::InvalidSubnet { .. } => (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: err.to_string(),
                error: None,
                allowed_ips: None,
            }),
        ).into_response(),
        Error::NoAddressAvailable { .. } => message(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to get available IP: {}", err),
        ),
        _ => {
            tracing::error!("{} {}", context, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse {
                    message: context.to_string(),
                    error: Some(err.diagnostic().map(String::from).unwrap_or_else(|| err.to_string())),
                    allowed_ips: None,
                }),
            ).into_response()
        }
    }
}

/// Keys are opaque, but must be a single non-empty `wg` argument
fn validate_public_key(public_key: &str) -> Result<()> {
    if public_key.is_empty() {
        return Err(Error::InvalidRequest("publicKey cannot be empty".into()));
    }
    if public_key.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRequest("publicKey cannot contain whitespace".into()));
    }
    Ok(())
}

// ============ Handlers ============

async fn handle_check_peer(
    State(state): State<Arc<AppState>>,
    Path(public_key): Path<String>,
) -> Response {
    match state.directory.check_peer(&public_key).await {
        Ok(()) => message(StatusCode::OK, "Peer exists."),
        Err(e) => error_response("Failed to check peer in WireGuard.", &e),
    }
}

async fn handle_add_peer(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AddPeerRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("Rejected add peer body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse {
                    message: "Invalid request.".to_string(),
                    error: Some(rejection.body_text()),
                    allowed_ips: None,
                }),
            ).into_response();
        }
    };

    if let Err(e) = validate_public_key(&req.public_key) {
        return error_response("Invalid request.", &e);
    }

    let allowed_ips = req.allowed_ips.as_deref().map(str::trim);
    if allowed_ips == Some("") {
        return error_response(
            "Invalid request.",
            &Error::InvalidRequest("allowedIPs cannot be empty".into()),
        );
    }

    match state.directory.add_peer(&req.public_key, allowed_ips).await {
        Ok(assigned) => (
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Peer added.".to_string(),
                error: None,
                allowed_ips: Some(assigned),
            }),
        ).into_response(),
        Err(e) if e.is_mutation_failure() => error_response("Failed to add peer.", &e),
        Err(e) => error_response("Failed to check peer in WireGuard.", &e),
    }
}

async fn handle_remove_peer(
    State(state): State<Arc<AppState>>,
    Path(public_key): Path<String>,
) -> Response {
    match state.directory.remove_peer(&public_key).await {
        Ok(RemoveOutcome::Removed) => message(StatusCode::OK, "Peer removed."),
        Ok(RemoveOutcome::NotFound) if state.strict_remove => {
            message(StatusCode::NOT_FOUND, "Peer not found.")
        }
        Ok(RemoveOutcome::NotFound) => message(StatusCode::OK, "Peer not found."),
        Err(e) if e.is_mutation_failure() => error_response("Failed to remove peer.", &e),
        Err(e) => error_response("Failed to check peer in WireGuard.", &e),
    }
}

async fn handle_available_ip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableIpQuery>,
) -> Response {
    let result = match query.subnet.as_deref() {
        Some(subnet) => match subnet.parse::<Subnet>() {
            Ok(subnet) => state.directory.allocate_in(&subnet).await,
            Err(e) => return error_response("Invalid request.", &e),
        },
        None => state.directory.allocate_address().await,
    };

    match result {
        Ok(available_ip) => Json(AvailableIpResponse { available_ip }).into_response(),
        Err(e) => error_response("Failed to get available IP.", &e),
    }
}

async fn handle_list_peers(
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.directory.list_peers().await {
        Ok(peers) => Json(peers).into_response(),
        Err(e) => error_response("Failed to list peers in WireGuard.", &e),
    }
}

async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        interface: state.directory.interface_name().to_string(),
        default_subnet: state.directory.default_subnet().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::wireguard::{MemoryInterface, WireGuardInterface};

    fn server(iface: &Arc<MemoryInterface>, strict_remove: bool) -> HttpServer {
        let directory = Arc::new(PeerDirectory::new(
            Arc::clone(iface) as Arc<dyn WireGuardInterface>,
            "10.200.200.0/32".parse().unwrap(),
        ));
        let config = ApiConfig {
            strict_remove,
            ..ApiConfig::default()
        };
        HttpServer::new(config, directory)
    }

    fn seeded() -> Arc<MemoryInterface> {
        Arc::new(MemoryInterface::with_peers(
            "wg0",
            [("abc123=", "10.200.200.2/32"), ("def456=", "10.200.200.3/32")],
        ))
    }

    async fn send(server: &HttpServer, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = server
            .router()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_check_peer() {
        let iface = seeded();
        let server = server(&iface, false);

        let (status, body) = send(&server, "GET", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Peer exists.");

        let (status, body) = send(&server, "GET", "/api/peer/zzz=", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Peer not found.");
    }

    #[tokio::test]
    async fn test_check_peer_with_encoded_slash() {
        let iface = Arc::new(MemoryInterface::with_peers("wg0", [("a/b+c=", "10.200.200.2/32")]));
        let server = server(&iface, false);

        let (status, _) = send(&server, "GET", "/peer/a%2Fb+c=", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_check_peer_query_failure() {
        let iface = seeded();
        iface.fail_queries(Some("Unable to access interface: No such device")).await;
        let server = server(&iface, false);

        let (status, body) = send(&server, "GET", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to check peer in WireGuard.");
        assert_eq!(body["error"], "Unable to access interface: No such device");
    }

    #[tokio::test]
    async fn test_add_peer() {
        let iface = seeded();
        let server = server(&iface, false);

        let req = serde_json::json!({"publicKey": "new789=", "allowedIPs": "10.200.200.9/32"});
        let (status, body) = send(&server, "POST", "/peer", Some(req)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Peer added.");

        let (status, _) = send(&server, "GET", "/peer/new789=", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_add_peer_allocates_when_allowed_ips_missing() {
        let iface = seeded();
        let server = server(&iface, false);

        let req = serde_json::json!({"publicKey": "new789="});
        let (status, body) = send(&server, "POST", "/api/peer", Some(req)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["allowedIPs"], "10.200.200.4/32");
    }

    #[tokio::test]
    async fn test_add_existing_peer_is_rejected() {
        let iface = seeded();
        let server = server(&iface, false);

        let req = serde_json::json!({"publicKey": "abc123=", "allowedIPs": "10.200.200.9/32"});
        let (status, body) = send(&server, "POST", "/peer", Some(req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Peer already exists.");
        assert_eq!(iface.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_add_peer_invalid_input() {
        let iface = seeded();
        let server = server(&iface, false);

        for req in [
            serde_json::json!({"publicKey": "", "allowedIPs": "10.200.200.9/32"}),
            serde_json::json!({"publicKey": "abc def=", "allowedIPs": "10.200.200.9/32"}),
            serde_json::json!({"publicKey": "new789=", "allowedIPs": "  "}),
        ] {
            let (status, _) = send(&server, "POST", "/peer", Some(req)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(iface.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_add_peer_mutation_failure() {
        let iface = seeded();
        iface.fail_mutations(Some("Key is not the correct length or format")).await;
        let server = server(&iface, false);

        let req = serde_json::json!({"publicKey": "bad", "allowedIPs": "10.200.200.9/32"});
        let (status, body) = send(&server, "POST", "/peer", Some(req)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to add peer.");
        assert_eq!(body["error"], "Key is not the correct length or format");
    }

    #[tokio::test]
    async fn test_add_peer_malformed_body() {
        let iface = seeded();
        let server = server(&iface, false);

        let req = serde_json::json!({"allowedIPs": "10.200.200.9/32"});
        let (status, body) = send(&server, "POST", "/peer", Some(req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request.");
        assert!(body["error"].as_str().unwrap().contains("publicKey"));

        let request = Request::builder()
            .method("POST")
            .uri("/peer")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("publicKey=new789%3D"))
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Invalid request.");
        assert!(body["error"].as_str().unwrap().contains("Content-Type"));

        assert_eq!(iface.mutation_count(), 0);
    }

    /// Reads from the wrapped table, every change times out
    struct StalledInterface(MemoryInterface);

    #[async_trait::async_trait]
    impl WireGuardInterface for StalledInterface {
        fn interface_name(&self) -> &str {
            self.0.interface_name()
        }

        async fn list_peers(&self) -> Result<Vec<String>> {
            self.0.list_peers().await
        }

        async fn peer_table(&self) -> Result<Vec<(String, Vec<String>)>> {
            self.0.peer_table().await
        }

        async fn set_peer(&self, _public_key: &str, _allowed_ips: &str) -> Result<()> {
            Err(Error::InterfaceTimeout { interface: "wg0".into(), secs: 10, mutation: true })
        }

        async fn remove_peer(&self, _public_key: &str) -> Result<()> {
            Err(Error::InterfaceTimeout { interface: "wg0".into(), secs: 10, mutation: true })
        }
    }

    #[tokio::test]
    async fn test_mutation_timeout_reported_as_mutation() {
        let iface = StalledInterface(MemoryInterface::with_peers("wg0", [("abc123=", "10.200.200.2/32")]));
        let directory = Arc::new(PeerDirectory::new(
            Arc::new(iface) as Arc<dyn WireGuardInterface>,
            "10.200.200.0/32".parse().unwrap(),
        ));
        let server = HttpServer::new(ApiConfig::default(), directory);

        let req = serde_json::json!({"publicKey": "new789="});
        let (status, body) = send(&server, "POST", "/peer", Some(req)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to add peer.");

        let (status, body) = send(&server, "DELETE", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to remove peer.");
    }

    #[tokio::test]
    async fn test_remove_peer() {
        let iface = seeded();
        let server = server(&iface, false);

        let (status, body) = send(&server, "DELETE", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Peer removed.");

        let (status, _) = send(&server, "GET", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_missing_peer() {
        let iface = seeded();

        let (status, body) = send(&server(&iface, false), "DELETE", "/peer/zzz=", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Peer not found.");

        let (status, body) = send(&server(&iface, true), "DELETE", "/peer/zzz=", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Peer not found.");
        assert_eq!(iface.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_peer_mutation_failure() {
        let iface = seeded();
        iface.fail_mutations(Some("Operation not permitted")).await;
        let server = server(&iface, false);

        let (status, body) = send(&server, "DELETE", "/peer/abc123=", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to remove peer.");
        assert_eq!(body["error"], "Operation not permitted");
    }

    #[tokio::test]
    async fn test_available_ip() {
        let iface = seeded();
        let server = server(&iface, false);

        let (status, body) = send(&server, "GET", "/available-ip", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["availableIP"], "10.200.200.4/32");

        let (status, body) = send(&server, "GET", "/api/available-ip?subnet=10.9.0.0/24", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["availableIP"], "10.9.0.2/24");

        let (status, _) = send(&server, "GET", "/available-ip?subnet=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_available_ip_exhausted() {
        let subnet: Subnet = "10.200.200.0/32".parse().unwrap();
        let peers: Vec<(String, String)> = (2..=254u8)
            .map(|h| (format!("peer{}=", h), subnet.candidate(h)))
            .collect();
        let iface = Arc::new(MemoryInterface::with_peers("wg0", peers));
        let server = server(&iface, false);

        let (status, body) = send(&server, "GET", "/available-ip", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to get available IP: No available IP address"));
    }

    #[tokio::test]
    async fn test_list_peers_and_health() {
        let iface = seeded();
        let server = server(&iface, false);

        let (status, body) = send(&server, "GET", "/peers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["publicKey"], "abc123=");
        assert_eq!(body[1]["allowedIPs"][0], "10.200.200.3/32");

        let (status, body) = send(&server, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interface"], "wg0");
        assert_eq!(body["defaultSubnet"], "10.200.200.0/32");
    }
}
