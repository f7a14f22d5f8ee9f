//! JSON API routes.
//!
//! - `POST /api/auth/register/`        — create an account and derive a wallet
//! - `POST /api/auth/token/`           — exchange credentials for a bearer token
//! - `POST /api/agents/setup/`         — create an agent from free-text requirements
//! - `POST /api/agents/{id}/shop/`     — start the shopping task (202 ack)
//! - `GET  /api/agents/{id}/status/`   — lifecycle snapshot
//! - `POST /api/transactions/verify/`  — verify a proposed transaction once
//!
//! Everything except register and token requires a bearer token; ownership is
//! enforced by the coordinator.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use trusty_agent::coordinator::{AgentStatusView, AgentTaskCoordinator, ShopAck, VerifyOutcome};
use trusty_agent::wallet::WalletService;
use trusty_core::domain::agent::{AgentId, AgentState};
use trusty_core::domain::constraint::{ConstraintSet, ConstraintSource};
use trusty_core::domain::transaction::TransactionId;
use trusty_core::domain::user::{User, UserId};
use trusty_core::errors::{ApplicationError, InterfaceError};
use trusty_db::repositories::{RepositoryError, UserRepository};

use crate::auth::AuthService;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<AgentTaskCoordinator>,
    pub auth: Arc<AuthService>,
    pub users: Arc<dyn UserRepository>,
    pub wallet: Arc<dyn WalletService>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/auth/register/", post(register))
        .route("/api/auth/token/", post(token))
        .route("/api/agents/setup/", post(setup_agent))
        .route("/api/agents/{id}/shop/", post(shop_agent))
        .route("/api/agents/{id}/status/", get(agent_status))
        .route("/api/transactions/verify/", post(verify_transaction))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub username: String,
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub requirements: String,
    pub max_budget: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub agent_id: AgentId,
    pub state: AgentState,
    pub constraint_source: Option<ConstraintSource>,
    pub constraints: Option<ConstraintSet>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub transaction_id: TransactionId,
    pub result: &'static str,
    pub transfer_hash: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
pub struct AuthUser(pub UserId);

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("missing bearer token"))?;

        let user_id = state
            .auth
            .authenticate(token)
            .map_err(|_| unauthorized("invalid or expired token"))?;
        Ok(AuthUser(user_id))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn register(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, Json<ErrorBody>)> {
    let username = body.username.trim();
    let email = body.email.trim();
    if username.is_empty() {
        return Err(bad_request("username is required"));
    }
    if !email.contains('@') {
        return Err(bad_request("email is not valid"));
    }
    if body.password.len() < 8 {
        return Err(bad_request("password must be at least 8 characters"));
    }

    let password_hash = state
        .auth
        .hash_password(&body.password)
        .map_err(|error| app_error(ApplicationError::Integration(error.to_string())))?;

    let user_id = UserId::generate();
    let wallet_address = state
        .wallet
        .create_wallet(&user_id)
        .await
        .map_err(|error| app_error(ApplicationError::Integration(error.to_string())))?;

    let user = User {
        id: user_id,
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
        wallet_address: wallet_address.clone(),
        created_at: Utc::now(),
    };
    match state.users.save(user).await {
        Ok(()) => {}
        Err(RepositoryError::Conflict(message)) => return Err(bad_request(message)),
        Err(error) => return Err(app_error(ApplicationError::Persistence(error.to_string()))),
    }

    info!(user_id = %user_id, username = %username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, username: username.to_string(), wallet_address }),
    ))
}

pub async fn token(
    State(state): State<ApiState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorBody>)> {
    let user = state
        .users
        .find_by_username(body.username.trim())
        .await
        .map_err(|error| app_error(ApplicationError::Persistence(error.to_string())))?;

    // Same response for unknown users and wrong passwords.
    let Some(user) = user else {
        return Err(unauthorized("unknown username or wrong password"));
    };
    if !state.auth.verify_password(&body.password, &user.password_hash) {
        return Err(unauthorized("unknown username or wrong password"));
    }

    let access_token = state
        .auth
        .issue_token(&user.id)
        .map_err(|error| app_error(ApplicationError::Integration(error.to_string())))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in_secs: state.auth.token_ttl_secs(),
    }))
}

pub async fn setup_agent(
    AuthUser(user_id): AuthUser,
    State(state): State<ApiState>,
    Json(body): Json<SetupRequest>,
) -> Result<(StatusCode, Json<SetupResponse>), (StatusCode, Json<ErrorBody>)> {
    if body.requirements.trim().is_empty() {
        return Err(bad_request("requirements text is required"));
    }

    let agent = state
        .coordinator
        .setup(user_id, &body.requirements, body.max_budget)
        .await
        .map_err(app_error)?;

    Ok((
        StatusCode::CREATED,
        Json(SetupResponse {
            agent_id: agent.id,
            state: agent.state,
            constraint_source: agent.constraint_source,
            constraints: agent.constraints,
        }),
    ))
}

pub async fn shop_agent(
    AuthUser(user_id): AuthUser,
    Path(agent_id): Path<Uuid>,
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<ShopAck>), (StatusCode, Json<ErrorBody>)> {
    let ack =
        state.coordinator.shop(user_id, AgentId(agent_id)).await.map_err(app_error)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

pub async fn agent_status(
    AuthUser(user_id): AuthUser,
    Path(agent_id): Path<Uuid>,
    State(state): State<ApiState>,
) -> Result<Json<AgentStatusView>, (StatusCode, Json<ErrorBody>)> {
    let view =
        state.coordinator.status(user_id, AgentId(agent_id)).await.map_err(app_error)?;
    Ok(Json(view))
}

pub async fn verify_transaction(
    AuthUser(user_id): AuthUser,
    State(state): State<ApiState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, Json<ErrorBody>)> {
    let outcome = state
        .coordinator
        .verify(user_id, TransactionId(body.transaction_id))
        .await
        .map_err(app_error)?;

    let response = match outcome {
        VerifyOutcome::Executed { transaction_id, transfer_hash } => VerifyResponse {
            transaction_id,
            result: "executed",
            transfer_hash: Some(transfer_hash),
            reason: None,
        },
        VerifyOutcome::Rejected { transaction_id, reason } => VerifyResponse {
            transaction_id,
            result: "rejected",
            transfer_hash: None,
            reason: Some(reason),
        },
    };
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn app_error(error: ApplicationError) -> (StatusCode, Json<ErrorBody>) {
    let correlation_id = new_correlation_id();
    tracing::warn!(correlation_id = %correlation_id, error = %error, "request failed");
    interface_error(error.into_interface(correlation_id))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    interface_error(InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: new_correlation_id(),
    })
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorBody>) {
    interface_error(InterfaceError::Unauthorized {
        message: message.to_string(),
        correlation_id: new_correlation_id(),
    })
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let correlation_id = error.correlation_id().to_string();
    (
        status,
        Json(ErrorBody { error: error.to_string(), message: error.user_message(), correlation_id }),
    )
}
