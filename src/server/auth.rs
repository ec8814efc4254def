//! Account and session routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{response::respond, AppState};
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub token: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    success: bool,
}

pub(super) fn bad_json(rejection: JsonRejection) -> ServiceError {
    ServiceError::bad_request(rejection.body_text())
}

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ServiceResult<Response> {
    let Json(req) = body.map_err(bad_json)?;
    let user = state
        .auth
        .register(&req.token, &req.login, &req.password)
        .await?;
    Ok(respond(RegisterResponse { login: user.login }))
}

/// POST /api/auth
pub async fn authenticate(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> ServiceResult<Response> {
    let Json(req) = body.map_err(bad_json)?;
    let token = state.auth.authenticate(&req.login, &req.password).await?;
    Ok(respond(AuthResponse { token }))
}

/// DELETE /api/auth/{token}
pub async fn logout(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ServiceResult<Response> {
    state.auth.logout(&token).await?;
    Ok(respond(LogoutResponse { success: true }))
}
