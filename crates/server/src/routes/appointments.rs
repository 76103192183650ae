use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use db::TransactionTrait;
use db::models::appointment::{Appointment, CreateAppointment, UpdateAppointment};
use db::types::{UserRole, VisitStatus};
use serde::Deserialize;
use services::services::{scheduling, visits};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState, AuthUser,
    error::ApiError,
    middleware::load_appointment_middleware,
    routes::forbid_visitor,
};

#[derive(Debug, Deserialize)]
pub struct AppointmentQuery {
    pub worker_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateAppointmentRequest {
    pub appointment: CreateAppointment,
    #[serde(default)]
    pub ignore_conflicts: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateAppointmentRequest {
    #[serde(flatten)]
    #[ts(flatten)]
    pub fields: UpdateAppointment,
    #[serde(default)]
    pub ignore_conflicts: bool,
}

pub async fn get_appointments(
    State(state): State<AppState>,
    Query(query): Query<AppointmentQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Appointment>>>, ApiError> {
    let appointments = Appointment::find_filtered(&state.db().pool, query.worker_id).await?;
    Ok(ResponseJson(ApiResponse::success(appointments)))
}

pub async fn get_appointment(
    Extension(appointment): Extension<Appointment>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(appointment)))
}

pub async fn create_appointment(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateAppointmentRequest>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    forbid_visitor(&auth)?;
    if auth.role == UserRole::Worker && payload.appointment.worker_id != auth.id {
        return Err(ApiError::Forbidden(
            "Workers may only schedule their own appointments".to_string(),
        ));
    }

    let tx = state.db().pool.begin().await?;
    scheduling::ensure_appointment_slot_free(
        &tx,
        payload.appointment.worker_id,
        payload.appointment.start_at,
        payload.appointment.end_at,
        None,
        payload.ignore_conflicts,
    )
    .await?;
    let created = Appointment::create(&tx, &payload.appointment, Uuid::new_v4()).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(created)))
}

pub async fn update_appointment(
    Extension(auth): Extension<AuthUser>,
    Extension(existing): Extension<Appointment>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateAppointmentRequest>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    forbid_visitor(&auth)?;
    let is_admin = auth.role == UserRole::Admin;
    if !is_admin {
        if existing.worker_id != auth.id {
            return Err(ApiError::Forbidden(
                "Workers may only edit their own appointments".to_string(),
            ));
        }
        if existing.status != VisitStatus::Planned {
            return Err(ApiError::Forbidden(
                "Only an administrator may edit a completed or cancelled appointment".to_string(),
            ));
        }
        if payload.fields.worker_id.is_some_and(|id| id != auth.id) {
            return Err(ApiError::Forbidden(
                "Workers may not reassign an appointment".to_string(),
            ));
        }
    }

    // Use existing values if not provided in update
    let subject = payload
        .fields
        .subject
        .clone()
        .unwrap_or_else(|| existing.subject.clone());
    let location = payload.fields.location.clone().or_else(|| existing.location.clone());
    let worker_id = payload.fields.worker_id.unwrap_or(existing.worker_id);
    let start_at = payload.fields.start_at.unwrap_or(existing.start_at);
    let end_at = payload.fields.end_at.unwrap_or(existing.end_at);

    let tx = state.db().pool.begin().await?;
    if existing.status != VisitStatus::Cancelled {
        scheduling::ensure_appointment_slot_free(
            &tx,
            worker_id,
            start_at,
            end_at,
            Some(existing.id),
            payload.ignore_conflicts,
        )
        .await?;
    }

    let updated = Appointment::update(
        &tx,
        existing.id,
        subject,
        location,
        worker_id,
        start_at,
        end_at,
    )
    .await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_appointment(
    Extension(auth): Extension<AuthUser>,
    Extension(appointment): Extension<Appointment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    visits::delete_appointment(&tx, &auth.user, &appointment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn complete_appointment(
    Extension(auth): Extension<AuthUser>,
    Extension(appointment): Extension<Appointment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let completed = visits::complete_appointment(&tx, &auth.user, &appointment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(completed)))
}

pub async fn cancel_appointment(
    Extension(auth): Extension<AuthUser>,
    Extension(appointment): Extension<Appointment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let cancelled = visits::cancel_appointment(&tx, &auth.user, &appointment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(cancelled)))
}

pub async fn replan_appointment(
    Extension(auth): Extension<AuthUser>,
    Extension(appointment): Extension<Appointment>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Appointment>>, ApiError> {
    forbid_visitor(&auth)?;
    let tx = state.db().pool.begin().await?;
    let replanned = visits::replan_appointment(&tx, &auth.user, &appointment).await?;
    tx.commit().await?;
    Ok(ResponseJson(ApiResponse::success(replanned)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let appointment_id_router = Router::new()
        .route(
            "/",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/complete", patch(complete_appointment))
        .route("/cancel", patch(cancel_appointment))
        .route("/replan", patch(replan_appointment))
        .layer(from_fn_with_state(state.clone(), load_appointment_middleware));

    let inner = Router::new()
        .route("/", get(get_appointments).post(create_appointment))
        .nest("/{appointment_id}", appointment_id_router);

    Router::new().nest("/appointments", inner)
}
