// Path: crates/gateway/src/handlers.rs
//! Route handlers: the three signing routes, the authenticated monitor,
//! and the unauthenticated health endpoints.
//!
//! One pipeline serves `/sign/file`, `/sign/data`, and `/sign/hash`; the
//! route fixes the capability the addressed signer must implement. The
//! request body is a JSON array of tasks, answered in input order.

use crate::hawk::{HawkHeader, RequestContext};
use crate::nonce::NonceCheck;
use crate::{observe_request, observe_task, AppError, GatewayState};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, request::Parts, Request, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quill_api::{merge_options, Capability, Signer};
use quill_types::error::AuthError;
use quill_types::wire::{SignatureRequest, SignatureResponse};
use quill_types::MAX_TASKS_PER_REQUEST;
use rand::RngCore;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

/// Fixed input the monitor endpoint signs with every registered signer.
const MONITOR_INPUT: &[u8] = b"QUILL MONITORING";

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn peer_ip(parts: &Parts) -> IpAddr {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Splits a `Host`-style value into host and port, defaulting the port.
fn split_host_port(value: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = value.strip_prefix('[') {
        // Bracketed IPv6 literal.
        if let Some((host, port)) = rest.split_once(']') {
            let port = port
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return (format!("[{}]", host), port);
        }
    }
    match value.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host.to_string(), port.parse().unwrap_or(default_port))
        }
        _ => (value.to_string(), default_port),
    }
}

/// Host and port of the canonical request. `X-Forwarded-*` is honored
/// only when the direct peer is inside a trusted-proxy CIDR.
fn canonical_host_port(state: &GatewayState, parts: &Parts) -> Result<(String, u16), AuthError> {
    let peer = peer_ip(parts);
    let proxied = state.trusted_proxies.iter().any(|cidr| cidr.contains(peer));

    if proxied {
        if let Some(forwarded_host) = header_str(parts, "x-forwarded-host") {
            let first = forwarded_host.split(',').next().unwrap_or("").trim();
            let default_port = match header_str(parts, "x-forwarded-proto") {
                Some(proto) if proto.eq_ignore_ascii_case("https") => 443,
                _ => 80,
            };
            let (host, mut port) = split_host_port(first, default_port);
            if let Some(p) = header_str(parts, "x-forwarded-port").and_then(|p| p.parse().ok()) {
                port = p;
            }
            return Ok((host, port));
        }
    }

    let host_header = header_str(parts, "host")
        .ok_or_else(|| AuthError::MalformedHeader("missing Host header".into()))?;
    Ok(split_host_port(host_header, 80))
}

/// Runs the full authentication pipeline for one request: Hawk header
/// parse, principal resolution, payload-hash and MAC verification,
/// timestamp skew, then replay suppression. Returns the principal id.
fn authenticate(
    state: &GatewayState,
    parts: &Parts,
    body: &[u8],
    resolve_secret: impl Fn(&str) -> Option<String>,
) -> Result<String, AuthError> {
    let raw = header_str(parts, "authorization")
        .ok_or_else(|| AuthError::MalformedHeader("missing Authorization header".into()))?;
    let header = HawkHeader::parse(raw)?;

    let secret = resolve_secret(&header.id)
        .ok_or_else(|| AuthError::UnknownPrincipal(header.id.clone()))?;

    let (host, port) = canonical_host_port(state, parts)?;
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let context = RequestContext {
        method: parts.method.as_str(),
        path,
        host: &host,
        port,
        content_type: header_str(parts, "content-type").unwrap_or(""),
        body,
    };

    state
        .authenticator
        .verify(&header, &secret, &context, now_unix())?;

    match state.nonces.check_and_insert(&header.id, &header.nonce) {
        NonceCheck::Ok => Ok(header.id),
        NonceCheck::Replay => Err(AuthError::Replay(header.id)),
    }
}

fn task_reference() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Decodes one task input per the route's encoding.
fn decode_input(capability: Capability, input: &str) -> Result<Vec<u8>, AppError> {
    match capability {
        Capability::File | Capability::Data => BASE64
            .decode(input.as_bytes())
            .map_err(|e| AppError::BadRequest(format!("invalid base64 input: {}", e))),
        Capability::Hash => hex::decode(input.as_bytes())
            .map_err(|e| AppError::BadRequest(format!("invalid hex digest: {}", e))),
    }
}

async fn process_task(
    state: &GatewayState,
    principal: &str,
    capability: Capability,
    task: &SignatureRequest,
) -> Result<SignatureResponse, AppError> {
    let input = decode_input(capability, &task.input)?;

    let signer_id = state.authz.resolve(principal, task.keyid.as_deref())?;
    let signer = state.registry.get(&signer_id).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "signer {} is authorized but not registered",
            signer_id
        ))
    })?;

    let options = merge_options(signer.defaults(), task.options.as_ref());

    let unsupported = || {
        AppError::Sign(quill_types::error::SignError::CapabilityUnsupported {
            signer: signer_id.clone(),
            capability: capability.as_str(),
        })
    };

    let mut response = SignatureResponse {
        reference: task_reference(),
        kind: signer.kind().to_string(),
        mode: signer.mode().to_string(),
        signer_id: signer_id.clone(),
        public_key: signer.public_key(),
        signature: None,
        signed_file: None,
        x5u: signer.x5u(),
    };

    let outcome = match capability {
        Capability::Data => match signer.as_data_signer() {
            Some(data_signer) => data_signer.sign_data(&input, &options).await.map(|sig| {
                response.signature = Some(sig.0);
            }),
            None => return Err(unsupported()),
        },
        Capability::File => match signer.as_file_signer() {
            Some(file_signer) => file_signer.sign_file(&input, &options).await.map(|signed| {
                response.signed_file = Some(BASE64.encode(signed.0));
            }),
            None => return Err(unsupported()),
        },
        Capability::Hash => match signer.as_hash_signer() {
            Some(hash_signer) => {
                if input.len() != hash_signer.digest_len() {
                    observe_task(&signer_id, capability.as_str(), "error");
                    return Err(AppError::Sign(
                        quill_types::error::SignError::BadDigestLength {
                            signer: signer_id.clone(),
                            expected: hash_signer.digest_len(),
                            got: input.len(),
                        },
                    ));
                }
                hash_signer.sign_hash(&input, &options).await.map(|sig| {
                    response.signature = Some(sig.0);
                })
            }
            None => return Err(unsupported()),
        },
    };

    match outcome {
        Ok(()) => {
            observe_task(&signer_id, capability.as_str(), "ok");
            Ok(response)
        }
        Err(e) => {
            observe_task(&signer_id, capability.as_str(), "error");
            Err(AppError::Sign(e))
        }
    }
}

async fn handle_sign(
    state: Arc<GatewayState>,
    capability: Capability,
    route: &'static str,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let result = handle_sign_inner(&state, capability, request).await;
    match &result {
        Ok(_) => observe_request(route, "ok", started),
        Err(_) => observe_request(route, "error", started),
    }
    result
}

async fn handle_sign_inner(
    state: &GatewayState,
    capability: Capability,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable body: {}", e)))?;

    let principal = authenticate(state, &parts, &body, |id| {
        state.principals.get(id).cloned()
    })?;

    let tasks: Vec<SignatureRequest> = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed request body: {}", e)))?;
    if tasks.is_empty() {
        return Err(AppError::BadRequest("empty task list".into()));
    }
    if tasks.len() > MAX_TASKS_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "at most {} tasks per request",
            MAX_TASKS_PER_REQUEST
        )));
    }

    // Tasks are processed and answered in input order.
    let mut responses = Vec::with_capacity(tasks.len());
    for task in &tasks {
        responses.push(process_task(state, &principal, capability, task).await?);
    }

    tracing::info!(
        target: "gateway",
        principal = %principal,
        capability = capability.as_str(),
        tasks = responses.len(),
        "signed"
    );
    Ok((StatusCode::CREATED, Json(responses)).into_response())
}

/// `POST /sign/file`
pub async fn sign_file(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    handle_sign(state, Capability::File, "/sign/file", request).await
}

/// `POST /sign/data`
pub async fn sign_data(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    handle_sign(state, Capability::Data, "/sign/data", request).await
}

/// `POST /sign/hash`
pub async fn sign_hash(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    handle_sign(state, Capability::Hash, "/sign/hash", request).await
}

/// Signs the fixed monitor input with `signer`, preferring the richest
/// capability it implements.
async fn monitor_sign(signer: &Arc<dyn Signer>) -> Result<SignatureResponse, AppError> {
    let mut response = SignatureResponse {
        reference: task_reference(),
        kind: signer.kind().to_string(),
        mode: signer.mode().to_string(),
        signer_id: signer.id().to_string(),
        public_key: signer.public_key(),
        signature: None,
        signed_file: None,
        x5u: signer.x5u(),
    };
    let options = signer.defaults();

    if let Some(data_signer) = signer.as_data_signer() {
        let sig = data_signer.sign_data(MONITOR_INPUT, &options).await?;
        response.signature = Some(sig.0);
    } else if let Some(file_signer) = signer.as_file_signer() {
        let signed = file_signer.sign_file(MONITOR_INPUT, &options).await?;
        response.signed_file = Some(BASE64.encode(signed.0));
    } else if let Some(hash_signer) = signer.as_hash_signer() {
        let digest = match hash_signer.digest_len() {
            48 => quill_crypto::digest::sha384(MONITOR_INPUT).to_vec(),
            _ => quill_crypto::digest::sha256(MONITOR_INPUT).to_vec(),
        };
        let sig = hash_signer.sign_hash(&digest, &options).await?;
        response.signature = Some(sig.0);
    } else {
        return Err(AppError::Internal(anyhow::anyhow!(
            "signer {} implements no capability",
            signer.id()
        )));
    }
    Ok(response)
}

/// `GET /__monitor__`: authenticated under the fixed `monitor` principal;
/// returns one signed response per registered signer, in registry order.
pub async fn monitor(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let secret = state
        .monitor_secret
        .clone()
        .ok_or_else(|| AppError::NotFound("monitoring is not configured".into()))?;

    let (parts, _body) = request.into_parts();
    authenticate(&state, &parts, b"", |id| {
        (id == "monitor").then(|| secret.clone())
    })?;

    let mut responses = Vec::with_capacity(state.registry.len());
    for signer in state.registry.signers() {
        responses.push(monitor_sign(signer).await?);
    }
    observe_request("/__monitor__", "ok", started);
    Ok((StatusCode::OK, Json(responses)).into_response())
}

/// `GET /__heartbeat__`: per-signer liveness; 503 when any probe fails.
pub async fn heartbeat(State(state): State<Arc<GatewayState>>) -> Response {
    let mut signers = serde_json::Map::new();
    let mut healthy = true;
    for signer in state.registry.signers() {
        match signer.probe().await {
            Ok(()) => {
                signers.insert(signer.id().to_string(), "ok".into());
            }
            Err(e) => {
                tracing::warn!(target: "gateway", signer = %signer.id(), "probe failed: {}", e);
                signers.insert(signer.id().to_string(), "unreachable".into());
                healthy = false;
            }
        }
    }
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "signers": signers,
    });
    (status, Json(body)).into_response()
}

/// `GET /__lbheartbeat__`: unconditional 200 for load balancers.
pub async fn lbheartbeat() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

/// `GET /__version__`: build metadata compiled into the binary.
pub async fn version() -> Response {
    let body = serde_json::json!({
        "name": "quill",
        "version": env!("CARGO_PKG_VERSION"),
        "source": "https://github.com/quillhq/quill",
        "build": option_env!("QUILL_BUILD").unwrap_or("dev"),
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Json(body),
    )
        .into_response()
}
