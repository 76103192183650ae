use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use chrono::{DateTime, Utc};
use db::TransactionTrait;
use db::models::assignment::{
    Assignment, AssignmentFilter, CreateAssignment, UpdateAssignment,
};
use db::types::{UserRole, VisitStatus};
use db::models::worked_hours::WorkedHours;
use serde::Deserialize;
use services::services::{
    scheduling::{self, RecurrenceRule},
    visits,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState, AuthUser,
    error::ApiError,
    middleware::load_assignment_middleware,
    routes::forbid_visitor,
};

#[derive(Debug, Deserialize)]
pub struct AssignmentQuery {
    pub worker_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateAssignmentsRequest {
    pub assignment: CreateAssignment,
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub ignore_conflicts: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateAssignmentRequest {
    #[serde(flatten)]
    #[ts(flatten)]
    pub fields: UpdateAssignment,
    #[serde(default)]
    pub ignore_conflicts: bool,
}

pub async fn get_assignments(
    State(state): State<AppState>,
    Query(query): Query<AssignmentQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Assignment>>>, ApiError> {
    let filter = AssignmentFilter {
        worker_id: query.worker_id,
        patient_id: query.patient_id,
        from: query.from,
        to: query.to,
    };
    let assignments = Assignment::find_filtered(&state.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(assignments)))
}

pub async fn get_assignment(
    Extension(assignment): Extension<Assignment>,
) -> Result<ResponseJson<ApiResponse<Assignment>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(assignment)))
}

/// Creates one assignment, or the whole expanded series for a recurring
/// request. The batch is all-or-nothing: the conflict gate rejects it with
/// 409 before any row is written, and every row is inserted in one
/// transaction.
pub async fn create_assignments(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateAssignmentsRequest>,
) -> Result<ResponseJson<ApiResponse<Vec<Assignment>>>, ApiError> {
    forbid_visitor(&auth)?;
    if auth.role == UserRole::Worker && payload.assignment.worker_id != auth.id {
        return Err(ApiError::Forbidden(
            "Workers may only schedule their own assignments".to_string(),
        ));
    }

    let occurrences = scheduling::expand_occurrences(
        payload.assignment.start_at,
        payload.assignment.end_at,
        payload.recurrence.as_ref(),
        Utc::now(),
    )?;

    tracing::debug!(
        worker_id = %payload.assignment.worker_id,
        patient_id = %payload.assignment.patient_id,
        occurrences = occurrences.len(),
        "Creating assignment batch"
    );

    let recurrence_group_id = payload.recurrence.as_ref().map(|_| Uuid::new_v4());

    let tx = state.db().pool.begin().await?;
    scheduling::ensure_assignment_slots_free(
        &tx,
        payload.assignment.worker_id,
        payload.assignment.patient_id,
        &occurrences,
        None,
        payload.ignore_conflicts,
    )
    .await?;

    let mut created = Vec::with_capacity(occurrences.len());
    for occurrence in &occurrences {
        let data = CreateAssignment {
            worker_id: payload.assignment.worker_id,
            patient_id: payload.assignment.patient_id,
            start_at: occurrence.start_at,
            end_at: occurrence.end_at,
        };
        created.push(Assignment::create(&tx, &data, Uuid::new_v4(), recurrence_group_id).await?);
    }
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(created)))
}

pub async fn update_assignment(
    Extension(auth): Extension<AuthUser>,
    Extension(existing): Extension<Assignment>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> Result<ResponseJson<ApiResponse<Assignment>>, ApiError> {
    forbid_visitor(&auth)?;
    let is_admin = auth.role == UserRole::Admin;
    if !is_admin {
        if existing.worker_id != auth.id {
            return Err(ApiError::Forbidden(
                "Workers may only edit their own assignments".to_string(),
            ));
        }
        if existing.status != VisitStatus::Planned {
            return Err(ApiError::Forbidden(
                "Only an administrator may edit a completed or cancelled assignment".to_string(),
            ));
        }
        if payload.fields.worker_id.is_some_and(|id| id != auth.id) {
            return Err(ApiError::Forbidden(
                "Workers may not reassign an assignment".to_string(),
            ));
        }
    }

    // Use existing values if not provided in update
    let worker_id = payload.fields.worker_id.unwrap_or(existing.worker_id);
    let patient_id = payload.fields.patient_id.unwrap_or(existing.patient_id);
    let start_at = payload.fields.start_at.unwrap_or(existing.start_at);
    let end_at = payload.fields.end_at.unwrap_or(existing.end_at);

    let occurrence = scheduling::Occurrence { start_at, end_at };

    let tx = state.db().pool.begin().await?;
    // Cancelled assignments stay out of the busy set, so only active ones
    // are gated here.
    if existing.status != VisitStatus::Cancelled {
        scheduling::ensure_assignment_slots_free(
            &tx,
            worker_id,
            patient_id,
            &[occurrence],
            Some(existing.id),
            payload.ignore_conflicts,
        )
        .await?;
    }

    let updated =
        Assignment::update(&tx, existing.id, worker_id, patient_id, start_at, end_at).await?;

    // Realized time mirrors the assignment interval.
    if updated.status == VisitStatus::Completed {
        WorkedHours::delete_by_assignment(&tx, updated.id).await?;
        WorkedHours::create_for_assignment(&tx, &updated).await?;
    }
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_assignment(
    Extension(auth): Extension<AuthUser>,
    Extension(assignment): Extension<Assignment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    visits::delete_assignment(&tx, &auth.user, &assignment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn complete_assignment(
    Extension(auth): Extension<AuthUser>,
    Extension(assignment): Extension<Assignment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Assignment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let completed = visits::complete_assignment(&tx, &auth.user, &assignment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(completed)))
}

pub async fn cancel_assignment(
    Extension(auth): Extension<AuthUser>,
    Extension(assignment): Extension<Assignment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Assignment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let cancelled = visits::cancel_assignment(&tx, &auth.user, &assignment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(cancelled)))
}

pub async fn replan_assignment(
    Extension(auth): Extension<AuthUser>,
    Extension(assignment): Extension<Assignment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Assignment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let replanned = visits::replan_assignment(&tx, &auth.user, &assignment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(replanned)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let assignment_id_router = Router::new()
        .route(
            "/",
            get(get_assignment)
                .put(update_assignment)
                .delete(delete_assignment),
        )
        .route("/complete", patch(complete_assignment))
        .route("/cancel", patch(cancel_assignment))
        .route("/replan", patch(replan_assignment))
        .layer(from_fn_with_state(state.clone(), load_assignment_middleware));

    let inner = Router::new()
        .route("/", get(get_assignments).post(create_assignments))
        .nest("/{assignment_id}", assignment_id_router);

    Router::new().nest("/assignments", inner)
}
