use axum::{
    Json,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::session::Session;
use utils::response::ApiResponse;

use crate::{AppState, AuthUser};

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let (prefix, rest) = trimmed.split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn extract_request_token(req: &Request) -> Option<String> {
    // 1) Authorization: Bearer <token>
    if let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
    {
        return Some(value.to_string());
    }

    // 2) X-Api-Token: <token>
    if let Some(value) = req
        .headers()
        .get("x-api-token")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(value.to_string());
    }

    None
}

fn unauthorized() -> Response {
    let response = ApiResponse::<()>::error("Unauthorized");
    (axum::http::StatusCode::UNAUTHORIZED, Json(response)).into_response()
}

pub async fn require_api_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_request_token(&req) else {
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            reason = "missing_token",
            "Unauthorized API request"
        );
        return unauthorized();
    };

    let resolved = match Session::find_user_by_token(&state.db().pool, &token).await {
        Ok(resolved) => resolved,
        Err(err) => {
            tracing::error!("Failed to resolve session token: {}", err);
            return unauthorized();
        }
    };

    let Some((session, user)) = resolved else {
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            reason = "invalid_or_expired_token",
            "Unauthorized API request"
        );
        return unauthorized();
    };

    let mut req = req;
    req.extensions_mut().insert(AuthUser {
        user,
        token: session.token,
    });
    next.run(req).await
}
