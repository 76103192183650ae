use axum::{
    Extension, Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use db::TransactionTrait;
use db::models::{appointment::Appointment, assignment::Assignment};
use serde::{Deserialize, Serialize};
use services::services::visits;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, AuthUser, error::ApiError, routes::forbid_visitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Delete,
    Cancel,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum BulkItemKind {
    Assignment,
    Appointment,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct BulkItem {
    pub kind: BulkItemKind,
    pub id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
pub struct BulkActionRequest {
    pub action: BulkAction,
    pub items: Vec<BulkItem>,
}

#[derive(Debug, Serialize, TS)]
pub struct BulkActionResult {
    pub processed: u64,
}

/// Applies one action to a typed batch of items. Per-item authorization and
/// state checks run inside a single transaction; the first failure rolls the
/// whole batch back.
pub async fn bulk_actions(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<BulkActionRequest>,
) -> Result<ResponseJson<ApiResponse<BulkActionResult>>, ApiError> {
    forbid_visitor(&auth)?;
    if payload.items.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one item is required".to_string(),
        ));
    }

    let tx = state.db().pool.begin().await?;
    let mut processed = 0;

    for item in &payload.items {
        match item.kind {
            BulkItemKind::Assignment => {
                let assignment = Assignment::find_by_id(&tx, item.id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("Assignment {} not found", item.id)))?;
                match payload.action {
                    BulkAction::Delete => {
                        visits::delete_assignment(&tx, &auth.user, &assignment).await?;
                    }
                    BulkAction::Cancel => {
                        visits::cancel_assignment(&tx, &auth.user, &assignment).await?;
                    }
                    BulkAction::Complete => {
                        visits::complete_assignment(&tx, &auth.user, &assignment).await?;
                    }
                }
            }
            BulkItemKind::Appointment => {
                let appointment = Appointment::find_by_id(&tx, item.id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("Appointment {} not found", item.id))
                    })?;
                match payload.action {
                    BulkAction::Delete => {
                        visits::delete_appointment(&tx, &auth.user, &appointment).await?;
                    }
                    BulkAction::Cancel => {
                        visits::cancel_appointment(&tx, &auth.user, &appointment).await?;
                    }
                    BulkAction::Complete => {
                        visits::complete_appointment(&tx, &auth.user, &appointment).await?;
                    }
                }
            }
        }
        processed += 1;
    }

    tx.commit().await?;

    tracing::info!(processed, action = ?payload.action, "Applied bulk action");
    Ok(ResponseJson(ApiResponse::success(BulkActionResult {
        processed,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/bulk/actions", post(bulk_actions))
}
