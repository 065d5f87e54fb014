// Path: crates/gateway/src/lib.rs
#![forbid(unsafe_code)]

//! # Quill HTTP Gateway
//!
//! The request-authorization and signing pipeline: Hawk authentication,
//! replay suppression, the authorization matrix, capability dispatch over
//! the signer registry, and response encoding. One request flows
//! authenticator → nonce cache → authorization → capability check →
//! signer invocation → envelope.

pub mod authz;
pub mod handlers;
pub mod hawk;
pub mod nonce;

use authz::AuthorizationMatrix;
use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use hawk::Authenticator;
use ipnetwork::IpNetwork;
use nonce::NonceCache;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec,
};
use quill_api::SignerDirectory;
use quill_types::config::ServiceConfig;
use quill_types::error::{AuthError, ErrorCode, SignError};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

// --- Error Handling ---

/// The gateway's response-side error type.
pub enum AppError {
    /// Authentication or authorization failure: 401.
    Auth(AuthError),
    /// Dispatch or signer failure; status depends on the variant.
    Sign(SignError),
    /// Malformed request body or input encoding: 400.
    BadRequest(String),
    /// Unknown or unconfigured resource: 404.
    NotFound(String),
    /// Unexpected internal failure: 500.
    Internal(anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Auth(e)
    }
}

impl From<SignError> for AppError {
    fn from(e: SignError) -> Self {
        AppError::Sign(e)
    }
}

/// The terse category a client sees; diagnostics stay in the log.
fn auth_category(e: &AuthError) -> &'static str {
    match e {
        AuthError::MalformedHeader(_) => "malformed authorization header",
        AuthError::UnknownPrincipal(_) => "unknown credentials",
        AuthError::StaleTimestamp => "timestamp outside allowed skew",
        AuthError::BadMac => "invalid request signature",
        AuthError::BadPayloadHash => "payload hash mismatch",
        AuthError::Replay(_) => "nonce already used",
        AuthError::ForbiddenSigner { .. } => "signer not permitted for this principal",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match self {
            AppError::Auth(e) => {
                tracing::warn!(target: "gateway", code = e.code(), "authentication rejected: {}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    auth_category(&e).to_string(),
                    e.code(),
                )
            }
            AppError::Sign(e) => {
                let status = match &e {
                    SignError::CapabilityUnsupported { .. } => StatusCode::FORBIDDEN,
                    SignError::BadDigestLength { .. } | SignError::BadOptions { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    SignError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let msg = match &e {
                    // The raw underlying cause is logged, not returned.
                    SignError::Internal { signer, reason } => {
                        tracing::error!(target: "gateway", signer = %signer, "signer failure: {}", reason);
                        format!("signer {} failed", signer)
                    }
                    other => other.to_string(),
                };
                (status, msg, e.code())
            }
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "INVALID_REQUEST"),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s, "NOT_FOUND"),
            AppError::Internal(e) => {
                tracing::error!(target: "gateway", "Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": {"code": code, "message": msg} })),
        )
            .into_response()
    }
}

// --- Metrics (local to gateway) ---
static GATEWAY_REQ_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static GATEWAY_REQ_LATENCY: OnceCell<HistogramVec> = OnceCell::new();
static GATEWAY_SIGN_TASKS: OnceCell<IntCounterVec> = OnceCell::new();

pub(crate) fn install_gateway_metrics() {
    GATEWAY_REQ_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            "quill_gateway_requests_total",
            "Total HTTP signing-gateway requests",
            &["route", "result"]
        )
        .expect("register_int_counter_vec")
    });
    GATEWAY_REQ_LATENCY.get_or_init(|| {
        register_histogram_vec!(
            "quill_gateway_request_duration_seconds",
            "Latency of HTTP signing-gateway requests (seconds)",
            &["route", "result"],
            exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register_histogram_vec")
    });
    GATEWAY_SIGN_TASKS.get_or_init(|| {
        register_int_counter_vec!(
            "quill_gateway_sign_tasks_total",
            "Signing tasks processed, by signer and capability",
            &["signer", "capability", "result"]
        )
        .expect("register_int_counter_vec")
    });
}

macro_rules! get_metric {
    ($m:ident) => {
        $m.get()
            .expect("install_gateway_metrics() must be called before serving")
    };
}

pub(crate) fn observe_request(route: &str, result: &str, started: Instant) {
    get_metric!(GATEWAY_REQ_TOTAL)
        .with_label_values(&[route, result])
        .inc();
    get_metric!(GATEWAY_REQ_LATENCY)
        .with_label_values(&[route, result])
        .observe(started.elapsed().as_secs_f64());
}

pub(crate) fn observe_task(signer: &str, capability: &str, result: &str) {
    get_metric!(GATEWAY_SIGN_TASKS)
        .with_label_values(&[signer, capability, result])
        .inc();
}

// --- Shared State ---

/// Everything the handlers read. Built once at startup; the nonce cache is
/// the only mutable member.
pub struct GatewayState {
    /// The read-only signer registry.
    pub registry: SignerDirectory,
    /// Principal id → shared Hawk secret.
    pub principals: HashMap<String, String>,
    /// The authorization matrix.
    pub authz: AuthorizationMatrix,
    /// The replay cache.
    pub nonces: NonceCache,
    /// Stateless Hawk verification settings.
    pub authenticator: Authenticator,
    /// CIDRs whose `X-Forwarded-*` headers are trusted.
    pub trusted_proxies: Vec<IpNetwork>,
    /// Secret for the fixed `monitor` principal, when monitoring is on.
    pub monitor_secret: Option<String>,
}

impl GatewayState {
    /// Assembles the gateway state from validated configuration and the
    /// registry the factory built.
    pub fn new(config: &ServiceConfig, registry: SignerDirectory) -> Self {
        let principals = config
            .principals
            .iter()
            .map(|p| (p.id.clone(), p.secret.clone()))
            .collect();
        let trusted_proxies = config
            .server
            .trusted_proxies
            .iter()
            .filter_map(|s| IpNetwork::from_str(s).ok())
            .collect();
        Self {
            registry,
            principals,
            authz: AuthorizationMatrix::from_config(&config.authorizations),
            nonces: NonceCache::new(
                config.server.nonce.capacity,
                Duration::from_secs(config.nonce_ttl_secs()),
            ),
            authenticator: Authenticator {
                max_skew_secs: config.server.max_skew_secs,
            },
            trusted_proxies,
            monitor_secret: config.monitor.as_ref().map(|m| m.secret.clone()),
        }
    }
}

// --- Rate Limiter ---
#[derive(Clone)]
struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxy_cidrs: Arc<Vec<IpNetwork>>,
}
#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}
impl IpLimiter {
    fn new(rps: u32, burst: u32, trusted_proxy_cidrs: Arc<Vec<IpNetwork>>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: rps as f64,
            burst: burst as f64,
            trusted_proxy_cidrs,
        }
    }
    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        if let Some(peer_ip) = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
        {
            if self
                .trusted_proxy_cidrs
                .iter()
                .any(|cidr| cidr.contains(peer_ip))
            {
                if let Some(xff) = req
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }
    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
    }
}

// Small helper used by HandleErrorLayer to produce structured responses.
async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "error": { "code": "TIMEOUT", "message": "request timed out" }
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": { "code": "OVERLOADED", "message": err.to_string() }
            })),
        )
    }
}

async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error = %e, "Failed to encode prometheus metrics");
    }
    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buf.into(),
    )
}

// --- Server ---

/// Transport settings for the gateway server.
pub struct GatewayConfig {
    /// Address and port to bind.
    pub listen_addr: String,
    /// Sustained per-IP request rate.
    pub rps: u32,
    /// Per-IP burst allowance.
    pub burst: u32,
    /// Maximum accepted request body, in KiB.
    pub body_limit_kb: usize,
    /// CIDRs of reverse proxies to trust for `X-Forwarded-*`.
    pub trusted_proxies: Vec<String>,
}

/// Assembles the full application router. Exposed so the test suite can
/// drive the service without binding a socket.
pub fn app(config: &GatewayConfig, state: Arc<GatewayState>) -> Router {
    install_gateway_metrics();

    let cidrs = Arc::new(
        config
            .trusted_proxies
            .iter()
            .filter_map(|s| IpNetwork::from_str(s).ok())
            .collect(),
    );
    let limiter = IpLimiter::new(config.rps, config.burst, cidrs);

    Router::new()
        .route("/sign/file", post(handlers::sign_file))
        .route("/sign/data", post(handlers::sign_data))
        .route("/sign/hash", post(handlers::sign_hash))
        .route("/__monitor__", get(handlers::monitor))
        .route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ))
        .route("/__heartbeat__", get(handlers::heartbeat))
        .route("/__lbheartbeat__", get(handlers::lbheartbeat))
        .route("/__version__", get(handlers::version))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        // Apply layers. The order is important: `HandleErrorLayer` must
        // wrap the fallible layers to make the service infallible.
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(128))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

/// Binds the listener and serves until the shutdown signal flips.
pub async fn run_server(
    config: GatewayConfig,
    state: Arc<GatewayState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = config.listen_addr.parse()?;
    let router = app(&config, state);

    tracing::info!(target: "gateway", "signing gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!(target: "gateway", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "gateway", error = %e, "server error");
    }

    Ok(())
}
