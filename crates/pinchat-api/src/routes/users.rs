use axum::{Extension, Json, extract::State};

use pinchat_types::api::{Claims, ProfileResponse, SearchUserRequest, UserSearchResponse};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    Ok(Json(state.identity.profile(claims.sub).await?))
}

pub async fn search(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SearchUserRequest>,
) -> Result<Json<UserSearchResponse>, ApiError> {
    Ok(Json(state.identity.search_by_pin(&req.pin).await?))
}
