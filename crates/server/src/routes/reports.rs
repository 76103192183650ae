use axum::{
    Extension, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use services::services::reports::{self, ActivityReport};
use utils::response::ApiResponse;

use crate::{AppState, AuthUser, error::ApiError, routes::require_admin};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn get_report(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<ResponseJson<ApiResponse<ActivityReport>>, ApiError> {
    require_admin(&auth)?;
    let (Some(from), Some(to)) = (query.from, query.to) else {
        return Err(ApiError::BadRequest(
            "Query parameters 'from' and 'to' are required".to_string(),
        ));
    };
    if from >= to {
        return Err(ApiError::BadRequest(
            "'from' must precede 'to'".to_string(),
        ));
    }

    let report = reports::activity_report(&state.db().pool, from, to).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub async fn get_active_months(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<String>>>, ApiError> {
    require_admin(&auth)?;
    let months = reports::active_months(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(months)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/reports",
        Router::new()
            .route("/", get(get_report))
            .route("/active-months", get(get_active_months)),
    )
}
