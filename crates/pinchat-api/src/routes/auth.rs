use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use pinchat_types::api::{
    AckResponse, EmailRequest, LoginRequest, RegisterRequest, ResetConfirmRequest, TokenResponse,
    VerifyRequest,
};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .identity
        .register(&req.email, &req.password, &req.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    Ok(Json(state.identity.verify(&req.email, &req.code).await?))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    Ok(Json(state.identity.login(&req.email, &req.password).await?))
}

pub async fn resend(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    Ok(Json(state.identity.resend_verification(&req.email).await?))
}

pub async fn request_reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    Ok(Json(state.identity.request_reset(&req.email).await?))
}

pub async fn confirm_reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetConfirmRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let ack = state
        .identity
        .confirm_reset(&req.email, &req.code, &req.new_password)
        .await?;
    Ok(Json(ack))
}
