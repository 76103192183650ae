use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::{CreateUser, UpdateUser, User, UserRole};
use serde::Deserialize;
use services::services::auth as auth_service;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState, AuthUser,
    error::ApiError,
    middleware::load_user_middleware,
    routes::require_admin,
};

#[derive(Debug, Deserialize, TS)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub hourly_rate_cents: Option<i64>,
    pub travel_cost_cents: Option<i64>,
}

pub async fn get_users(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    require_admin(&auth)?;
    let users = User::find_all(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn get_user(
    Extension(auth): Extension<AuthUser>,
    Extension(user): Extension<User>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    require_admin(&auth)?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn create_user(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    require_admin(&auth)?;
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let salt = auth_service::generate_salt();
    let data = CreateUser {
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        email: email.to_string(),
        password_hash: auth_service::hash_password(&payload.password, &salt),
        password_salt: salt,
        role: payload.role.clone().unwrap_or_default(),
        hourly_rate_cents: payload.hourly_rate_cents.unwrap_or(0),
        travel_cost_cents: payload.travel_cost_cents.unwrap_or(0),
    };

    let user = User::create(&state.db().pool, &data, Uuid::new_v4()).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn update_user(
    Extension(auth): Extension<AuthUser>,
    Extension(existing): Extension<User>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    require_admin(&auth)?;
    let user = User::update(&state.db().pool, existing.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn delete_user(
    Extension(auth): Extension<AuthUser>,
    Extension(user): Extension<User>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    require_admin(&auth)?;
    if user.id == auth.id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    User::delete(&state.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let user_id_router = Router::new()
        .route("/", get(get_user).put(update_user).delete(delete_user))
        .layer(from_fn_with_state(state.clone(), load_user_middleware));

    let inner = Router::new()
        .route("/", get(get_users).post(create_user))
        .nest("/{user_id}", user_id_router);

    Router::new().nest("/users", inner)
}
