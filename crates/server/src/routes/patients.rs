use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::patient::{CreatePatient, Patient, UpdatePatient};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState, AuthUser,
    error::ApiError,
    middleware::load_patient_middleware,
    routes::require_admin,
};

pub async fn get_patients(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Patient>>>, ApiError> {
    let patients = Patient::find_all(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(patients)))
}

pub async fn get_patient(
    Extension(patient): Extension<Patient>,
) -> Result<ResponseJson<ApiResponse<Patient>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(patient)))
}

pub async fn create_patient(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreatePatient>,
) -> Result<ResponseJson<ApiResponse<Patient>>, ApiError> {
    require_admin(&auth)?;
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Patient first and last name are required".to_string(),
        ));
    }

    let patient = Patient::create(&state.db().pool, &payload, Uuid::new_v4()).await?;
    Ok(ResponseJson(ApiResponse::success(patient)))
}

pub async fn update_patient(
    Extension(auth): Extension<AuthUser>,
    Extension(existing): Extension<Patient>,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePatient>,
) -> Result<ResponseJson<ApiResponse<Patient>>, ApiError> {
    require_admin(&auth)?;
    let patient = Patient::update(&state.db().pool, existing.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(patient)))
}

pub async fn delete_patient(
    Extension(auth): Extension<AuthUser>,
    Extension(patient): Extension<Patient>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    require_admin(&auth)?;
    Patient::delete(&state.db().pool, patient.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let patient_id_router = Router::new()
        .route(
            "/",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .layer(from_fn_with_state(state.clone(), load_patient_middleware));

    let inner = Router::new()
        .route("/", get(get_patients).post(create_patient))
        .nest("/{patient_id}", patient_id_router);

    Router::new().nest("/patients", inner)
}
