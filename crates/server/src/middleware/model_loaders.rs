use std::{fmt::Display, future::Future};

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use db::models::{
    appointment::Appointment, assignment::Assignment, expense::Expense, patient::Patient,
    user::User,
};
use uuid::Uuid;

use crate::AppState;

async fn fetch_model_or_status<M, E, Fut>(
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<M, StatusCode>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::warn!("{model_name} {model_id} not found");
            Err(StatusCode::NOT_FOUND)
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<Response, StatusCode>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_status(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

pub async fn load_assignment_middleware(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    load_request_extension(
        request,
        next,
        "Assignment",
        assignment_id,
        Assignment::find_by_id(&state.db().pool, assignment_id),
    )
    .await
}

pub async fn load_appointment_middleware(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    load_request_extension(
        request,
        next,
        "Appointment",
        appointment_id,
        Appointment::find_by_id(&state.db().pool, appointment_id),
    )
    .await
}

pub async fn load_patient_middleware(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    load_request_extension(
        request,
        next,
        "Patient",
        patient_id,
        Patient::find_by_id(&state.db().pool, patient_id),
    )
    .await
}

pub async fn load_user_middleware(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    load_request_extension(
        request,
        next,
        "User",
        user_id,
        User::find_by_id(&state.db().pool, user_id),
    )
    .await
}

pub async fn load_expense_middleware(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    load_request_extension(
        request,
        next,
        "Expense",
        expense_id,
        Expense::find_by_id(&state.db().pool, expense_id),
    )
    .await
}
