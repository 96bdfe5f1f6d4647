//!
//! signalhub HTTP server
//! ---------------------
//! Axum routes over the identity and ingestion modules.
//!
//! Responsibilities:
//! - Login (`/auth/login`) issuing session tokens.
//! - Device registration and maintenance; registration is the only place a device token is shown.
//! - Signal definitions and signal value ingestion. `POST /signal-values` accepts either a user
//!   session or a device token; every other protected route requires a user session.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{
    ensure_user, AuthMode, AuthProvider, AuthResolver, AuthorizationContext, DeviceRegistration, DeviceTokenIssuer,
    LocalAuthProvider, LoginRequest, LoginResponse, SessionTokenIssuer,
};
use crate::ingest::{IngestionValidator, SignalValueSubmission};
use crate::storage::{
    expand_signal_value, Device, DeviceId, DeviceUpdate, Direction, MemoryStore, NewSignal, SharedStore, Signal,
    SignalType, SignalValueId, SignalValueView,
};

/// Shared server state injected into all handlers. Everything in here is immutable
/// after startup except what lives behind the store.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub resolver: AuthResolver,
    pub provider: Arc<dyn AuthProvider>,
    pub ingest: IngestionValidator,
}

impl AppState {
    pub fn new(store: SharedStore, sessions: SessionTokenIssuer) -> Self {
        let sessions = Arc::new(sessions);
        let resolver = AuthResolver::new(sessions.clone(), DeviceTokenIssuer::new(store.clone()));
        let provider: Arc<dyn AuthProvider> = Arc::new(LocalAuthProvider::new(store.clone(), sessions));
        let ingest = IngestionValidator::new(store.clone());
        Self { store, resolver, provider, ingest }
    }

    fn authorize(&self, headers: &HeaderMap, mode: AuthMode) -> AppResult<AuthorizationContext> {
        Ok(self.resolver.resolve_headers(headers, mode)?)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "signalhub ok" }))
        .route("/auth/login", post(login))
        .route("/auth/register-device", post(register_device))
        .route("/devices/{id}", put(update_device).delete(delete_device))
        .route("/signals", post(create_signal))
        .route("/signal-values", post(create_signal_value))
        .route("/signal-values/{id}", get(get_signal_value))
        .with_state(state)
}

/// Build state from `config` over a fresh in-memory store and serve until the listener fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store: SharedStore = Arc::new(MemoryStore::new());
    if let Some((email, password)) = &config.bootstrap {
        ensure_user(&store, "Administrator", email, password).context("While ensuring bootstrap user")?;
    }
    let sessions = SessionTokenIssuer::new(&config.jwt_secret).with_ttl(config.session_ttl);
    let app = router(AppState::new(store, sessions));

    let addr: SocketAddr = format!("{}:{}", config.bind, config.http_port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.http_port))?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|_| AppError::user("invalid_body", "Invalid request body"))
}

fn path_id(id: Result<Path<u64>, PathRejection>, what: &str) -> AppResult<u64> {
    id.map(|Path(v)| v)
        .map_err(|_| AppError::user("invalid_id".to_string(), format!("Invalid {} ID", what)))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let req = body(payload)?;
    Ok(Json(state.provider.login(&req)?))
}

#[derive(Debug, Serialize)]
struct RegisterDeviceResponse {
    device: Device,
    auth_token: String,
}

async fn register_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeviceRegistration>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.authorize(&headers, AuthMode::UserOnly)?;
    let reg = body(payload)?;
    if reg.name.trim().is_empty() {
        return Err(AppError::user("missing_field", "name is required"));
    }
    let device = state.resolver.devices().register(ctx.authenticated_user(), reg)?;
    let auth_token = device.auth_token.clone();
    Ok((StatusCode::CREATED, Json(RegisterDeviceResponse { device, auth_token })))
}

async fn update_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<DeviceId>, PathRejection>,
    payload: Result<Json<DeviceUpdate>, JsonRejection>,
) -> AppResult<Json<Device>> {
    let ctx = state.authorize(&headers, AuthMode::UserOnly)?;
    let id = path_id(id, "device")?;
    let update = body(payload)?;
    let device = state.store.update_device(id, update)?;
    info!(request_id = %ctx.request_id, device_id = id, active = device.is_active, "device updated");
    Ok(Json(device))
}

async fn delete_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<DeviceId>, PathRejection>,
) -> AppResult<StatusCode> {
    let ctx = state.authorize(&headers, AuthMode::UserOnly)?;
    let id = path_id(id, "device")?;
    state.store.delete_device(id)?;
    info!(request_id = %ctx.request_id, device_id = id, "device deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateSignalRequest {
    #[serde(default)]
    device_id: Option<DeviceId>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    signal_type: Option<SignalType>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
}

async fn create_signal(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateSignalRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    state.authorize(&headers, AuthMode::UserOnly)?;
    let req = body(payload)?;
    let Some(device_id) = req.device_id.filter(|id| *id != 0) else {
        return Err(AppError::user("missing_field", "device_id is required"));
    };
    if let (Some(min), Some(max)) = (req.min_value, req.max_value) {
        if min > max {
            return Err(AppError::user("invalid_range", "min_value must not exceed max_value"));
        }
    }
    let signal: Signal = state
        .store
        .create_signal(NewSignal {
            device_id,
            name: req.name,
            signal_type: req.signal_type.unwrap_or_default(),
            direction: req.direction.unwrap_or_default(),
            unit: req.unit,
            description: req.description,
            min_value: req.min_value,
            max_value: req.max_value,
        })
        .map_err(|e| match e {
            crate::storage::StoreError::NotFound => AppError::not_found("device_not_found", "Device not found"),
            other => other.into(),
        })?;
    Ok((StatusCode::CREATED, Json(signal)))
}

async fn create_signal_value(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SignalValueSubmission>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.authorize(&headers, AuthMode::Either)?;
    let submission = body(payload)?;
    let stored = state.ingest.ingest(&ctx, submission)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn get_signal_value(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<SignalValueId>, PathRejection>,
) -> AppResult<Json<SignalValueView>> {
    state.authorize(&headers, AuthMode::UserOnly)?;
    let id = path_id(id, "signal value")?;
    let view = expand_signal_value(state.store.as_ref(), id).map_err(|e| match e {
        crate::storage::StoreError::NotFound => AppError::not_found("not_found", "Signal value not found"),
        other => other.into(),
    })?;
    Ok(Json(view))
}
