use axum::{
    Extension, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use services::services::{
    backup::{self, BackupDump},
    storage::{self, StorageStats},
};
use utils::response::ApiResponse;

use crate::{AppState, AuthUser, error::ApiError, routes::require_admin};

pub async fn get_backup(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<BackupDump>>, ApiError> {
    require_admin(&auth)?;
    let dump = backup::export(&state.db().pool).await?;
    tracing::info!(
        users = dump.users.len(),
        assignments = dump.assignments.len(),
        "Exported backup"
    );
    Ok(ResponseJson(ApiResponse::success(dump)))
}

pub async fn get_storage(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<StorageStats>>, ApiError> {
    require_admin(&auth)?;
    let stats = storage::stats(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(stats)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route("/backup", get(get_backup))
            .route("/storage", get(get_storage)),
    )
}
