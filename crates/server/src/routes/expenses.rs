use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use chrono::NaiveDate;
use db::models::expense::{CreateExpense, Expense, UpdateExpense};
use serde::Deserialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState, AuthUser,
    error::ApiError,
    middleware::load_expense_middleware,
    routes::require_admin,
};

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn get_expenses(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ExpenseQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Expense>>>, ApiError> {
    require_admin(&auth)?;
    let expenses = Expense::find_filtered(&state.db().pool, query.from, query.to).await?;
    Ok(ResponseJson(ApiResponse::success(expenses)))
}

pub async fn get_expense(
    Extension(auth): Extension<AuthUser>,
    Extension(expense): Extension<Expense>,
) -> Result<ResponseJson<ApiResponse<Expense>>, ApiError> {
    require_admin(&auth)?;
    Ok(ResponseJson(ApiResponse::success(expense)))
}

pub async fn create_expense(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateExpense>,
) -> Result<ResponseJson<ApiResponse<Expense>>, ApiError> {
    require_admin(&auth)?;
    if payload.label.trim().is_empty() {
        return Err(ApiError::BadRequest("Expense label is required".to_string()));
    }

    let expense =
        Expense::create(&state.db().pool, &payload, Uuid::new_v4(), Some(auth.id)).await?;
    Ok(ResponseJson(ApiResponse::success(expense)))
}

pub async fn update_expense(
    Extension(auth): Extension<AuthUser>,
    Extension(existing): Extension<Expense>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateExpense>,
) -> Result<ResponseJson<ApiResponse<Expense>>, ApiError> {
    require_admin(&auth)?;
    let expense = Expense::update(&state.db().pool, existing.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(expense)))
}

pub async fn delete_expense(
    Extension(auth): Extension<AuthUser>,
    Extension(expense): Extension<Expense>,
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    require_admin(&auth)?;
    Expense::delete(&state.db().pool, expense.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let expense_id_router = Router::new()
        .route(
            "/",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .layer(from_fn_with_state(state.clone(), load_expense_middleware));

    let inner = Router::new()
        .route("/", get(get_expenses).post(create_expense))
        .nest("/{expense_id}", expense_id_router);

    Router::new().nest("/expenses", inner)
}
