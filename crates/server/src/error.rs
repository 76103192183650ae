use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{
        appointment::AppointmentError, assignment::AssignmentError, expense::ExpenseError,
        patient::PatientError, session::SessionError, user::UserError,
        worked_hours::WorkedHoursError,
    },
};
use services::services::{scheduling::SchedulingError, visits::VisitError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Patient(#[from] PatientError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Appointment(#[from] AppointmentError),
    #[error(transparent)]
    WorkedHours(#[from] WorkedHoursError),
    #[error(transparent)]
    Expense(#[from] ExpenseError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Visit(#[from] VisitError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<&'static str> for ApiError {
    fn from(msg: &'static str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }
}

fn scheduling_status(err: &SchedulingError) -> StatusCode {
    match err {
        SchedulingError::Conflict { .. } => StatusCode::CONFLICT,
        SchedulingError::ValidationError(_) => StatusCode::BAD_REQUEST,
        SchedulingError::Assignment(inner) => assignment_status(inner),
        SchedulingError::Appointment(inner) => appointment_status(inner),
        SchedulingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn assignment_status(err: &AssignmentError) -> StatusCode {
    match err {
        AssignmentError::AssignmentNotFound => StatusCode::NOT_FOUND,
        AssignmentError::WorkerNotFound | AssignmentError::PatientNotFound => {
            StatusCode::BAD_REQUEST
        }
        AssignmentError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AssignmentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn appointment_status(err: &AppointmentError) -> StatusCode {
    match err {
        AppointmentError::AppointmentNotFound => StatusCode::NOT_FOUND,
        AppointmentError::WorkerNotFound => StatusCode::BAD_REQUEST,
        AppointmentError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppointmentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn visit_status(err: &VisitError) -> StatusCode {
    match err {
        VisitError::Forbidden(_) => StatusCode::FORBIDDEN,
        VisitError::InvalidTransition { .. } => StatusCode::CONFLICT,
        VisitError::Assignment(inner) => assignment_status(inner),
        VisitError::Appointment(inner) => appointment_status(inner),
        VisitError::Scheduling(inner) => scheduling_status(inner),
        VisitError::WorkedHours(inner) => match inner {
            WorkedHoursError::AssignmentNotFound | WorkedHoursError::WorkerNotFound => {
                StatusCode::NOT_FOUND
            }
            WorkedHoursError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        VisitError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::User(err) => match err {
                UserError::UserNotFound => (StatusCode::NOT_FOUND, "UserError"),
                UserError::EmailTaken => (StatusCode::CONFLICT, "UserError"),
                UserError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UserError"),
            },
            ApiError::Patient(err) => match err {
                PatientError::PatientNotFound => (StatusCode::NOT_FOUND, "PatientError"),
                PatientError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PatientError"),
            },
            ApiError::Assignment(err) => (assignment_status(err), "AssignmentError"),
            ApiError::Appointment(err) => (appointment_status(err), "AppointmentError"),
            ApiError::WorkedHours(err) => match err {
                WorkedHoursError::AssignmentNotFound | WorkedHoursError::WorkerNotFound => {
                    (StatusCode::NOT_FOUND, "WorkedHoursError")
                }
                WorkedHoursError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "WorkedHoursError")
                }
            },
            ApiError::Expense(err) => match err {
                ExpenseError::ExpenseNotFound => (StatusCode::NOT_FOUND, "ExpenseError"),
                ExpenseError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ExpenseError"),
                ExpenseError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ExpenseError"),
            },
            ApiError::Session(err) => match err {
                SessionError::NotFound | SessionError::UserNotFound => {
                    (StatusCode::UNAUTHORIZED, "SessionError")
                }
                SessionError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SessionError"),
            },
            ApiError::Scheduling(err) => (scheduling_status(err), "SchedulingError"),
            ApiError::Visit(err) => (visit_status(err), "VisitError"),
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IoError"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "ConflictError"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "ForbiddenError"),
        };

        let error_message = match &self {
            ApiError::Unauthorized => "Unauthorized. Please sign in again.".to_string(),
            ApiError::Session(SessionError::NotFound | SessionError::UserNotFound) => {
                "Unauthorized. Please sign in again.".to_string()
            }
            ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Forbidden(msg) => msg.clone(),
            ApiError::Scheduling(err) => err.to_string(),
            ApiError::Visit(err) => err.to_string(),
            ApiError::User(err) => err.to_string(),
            ApiError::Patient(err) => err.to_string(),
            ApiError::Assignment(err) => err.to_string(),
            ApiError::Appointment(err) => err.to_string(),
            ApiError::Expense(err) => err.to_string(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("conflict".to_string())
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(UserError::UserNotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(UserError::EmailTaken)
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(PatientError::PatientNotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AssignmentError::ValidationError("bad".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SchedulingError::Conflict {
                dimension: "worker",
                start_at: Utc::now(),
            })
            .into_response()
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(VisitError::Forbidden("no".to_string()))
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }
}
