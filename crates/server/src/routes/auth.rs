use axum::{
    Extension, Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{session::Session, user::User};
use serde::{Deserialize, Serialize};
use services::services::auth as auth_service;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, AuthUser, error::ApiError};

#[derive(Debug, Deserialize, TS)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, TS)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<LoginResponse>>, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let resolved = User::find_by_email_with_credentials(&state.db().pool, email).await?;
    let Some((user, credentials)) = resolved else {
        tracing::warn!(email, "Login attempt for unknown email");
        return Err(ApiError::Unauthorized);
    };

    if !auth_service::verify_password(
        &payload.password,
        &credentials.password_salt,
        &credentials.password_hash,
    ) {
        tracing::warn!(email, "Login attempt with wrong password");
        return Err(ApiError::Unauthorized);
    }

    let token = auth_service::generate_token();
    Session::create(&state.db().pool, user.id, &token, state.session_ttl_secs()).await?;

    tracing::info!(user_id = %user.id, "User signed in");
    Ok(ResponseJson(ApiResponse::success(LoginResponse {
        token,
        user,
    })))
}

pub async fn logout(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Session::delete_by_token(&state.db().pool, &auth.token).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn me(
    Extension(auth): Extension<AuthUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(auth.user)))
}

/// Routes that sit behind the session middleware. `login` itself is mounted
/// on the public side of the router.
pub fn protected_router() -> Router<AppState> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/logout", post(logout))
            .route("/me", get(me)),
    )
}
