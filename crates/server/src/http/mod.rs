use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::{AppState, routes};

mod auth;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::auth::protected_router())
        .merge(routes::assignments::router(&state))
        .merge(routes::appointments::router(&state))
        .merge(routes::patients::router(&state))
        .merge(routes::users::router(&state))
        .merge(routes::expenses::router(&state))
        .merge(routes::bulk::router())
        .merge(routes::reports::router())
        .merge(routes::admin::router())
        .layer(from_fn_with_state(state.clone(), auth::require_api_auth));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest(
            "/api",
            Router::new()
                .route("/auth/login", post(routes::auth::login))
                .merge(api_routes),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use chrono::{DateTime, TimeZone, Utc};
    use db::models::{
        patient::{CreatePatient, Patient},
        session::Session,
        user::{CreateUser, User, UserRole},
        worked_hours::WorkedHours,
    };
    use serde_json::{Value, json};
    use services::services::auth as auth_service;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{AppState, test_support::TestEnvGuard};

    const ADMIN_TOKEN: &str = "test-admin-token";
    const WORKER_TOKEN: &str = "test-worker-token";
    const OTHER_WORKER_TOKEN: &str = "test-other-worker-token";
    const VISITOR_TOKEN: &str = "test-visitor-token";

    struct Seeded {
        state: AppState,
        worker_id: Uuid,
        other_worker_id: Uuid,
        patient_id: Uuid,
    }

    async fn make_user(pool: &db::DbPool, email: &str, role: UserRole, token: &str) -> Uuid {
        let salt = auth_service::generate_salt();
        let user = User::create(
            pool,
            &CreateUser {
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                email: email.to_string(),
                password_hash: auth_service::hash_password("sup3r-secret", &salt),
                password_salt: salt,
                role,
                hourly_rate_cents: 2_000,
                travel_cost_cents: 300,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Session::create(pool, user.id, token, 3_600).await.unwrap();
        user.id
    }

    async fn setup() -> (TestEnvGuard, Seeded) {
        let temp_root = std::env::temp_dir().join(format!("careplan-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&temp_root).unwrap();

        let db_path = temp_root.join("db.sqlite");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let env_guard = TestEnvGuard::new(&temp_root, db_url);

        let state = AppState::new().await.unwrap();
        let pool = &state.db().pool;

        make_user(pool, "admin@example.com", UserRole::Admin, ADMIN_TOKEN).await;
        let worker_id = make_user(pool, "worker@example.com", UserRole::Worker, WORKER_TOKEN).await;
        let other_worker_id =
            make_user(pool, "other@example.com", UserRole::Worker, OTHER_WORKER_TOKEN).await;
        make_user(pool, "visitor@example.com", UserRole::Visitor, VISITOR_TOKEN).await;

        let patient_id = Uuid::new_v4();
        Patient::create(
            pool,
            &CreatePatient {
                first_name: "Jean".to_string(),
                last_name: "Petit".to_string(),
                address: "1 rue de la Paix".to_string(),
                phone: None,
                notes: None,
            },
            patient_id,
        )
        .await
        .unwrap();

        (
            env_guard,
            Seeded {
                state,
                worker_id,
                other_worker_id,
                patient_id,
            },
        )
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
    }

    fn assignment_body(
        worker_id: Uuid,
        patient_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore_conflicts: bool,
    ) -> Value {
        json!({
            "assignment": {
                "worker_id": worker_id,
                "patient_id": patient_id,
                "start_at": start.to_rfc3339(),
                "end_at": end.to_rfc3339(),
            },
            "ignore_conflicts": ignore_conflicts,
        })
    }

    async fn list_assignments(app: &axum::Router, token: &str) -> Vec<Value> {
        let response = app
            .clone()
            .oneshot(request("GET", "/api/assignments", Some(token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        json["data"].as_array().unwrap().clone()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_env_guard, seeded) = setup().await;
        let app = super::router(seeded.state);

        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_requires_a_session_token() {
        let (_env_guard, seeded) = setup().await;
        let app = super::router(seeded.state);

        let response = app
            .oneshot(request("GET", "/api/assignments", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(response).await;
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["message"], json!("Unauthorized"));
    }

    #[tokio::test]
    async fn login_issues_a_working_token() {
        let (_env_guard, seeded) = setup().await;
        let app = super::router(seeded.state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "worker@example.com", "password": "sup3r-secret"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let token = json["data"]["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request("GET", "/api/auth/me", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["email"], json!("worker@example.com"));

        let response = app
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "worker@example.com", "password": "wrong"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn overlapping_assignment_needs_the_override() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        // Worker W, 09:00-10:00.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 09:30-10:30 without override: 409 and no partial writes.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 30),
                    at(2, 10, 30),
                    false,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert!(
            json["message"].as_str().unwrap().contains("worker"),
            "conflict message should identify the dimension: {json}"
        );
        assert_eq!(list_assignments(&app, WORKER_TOKEN).await.len(), 1);

        // Same request with the override: both rows exist afterwards.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 30),
                    at(2, 10, 30),
                    true,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(list_assignments(&app, WORKER_TOKEN).await.len(), 2);
    }

    #[tokio::test]
    async fn adjacent_intervals_do_not_conflict() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        for (start, end) in [(at(2, 9, 0), at(2, 10, 0)), (at(2, 10, 0), at(2, 11, 0))] {
            let response = app
                .clone()
                .oneshot(request(
                    "POST",
                    "/api/assignments",
                    Some(WORKER_TOKEN),
                    Some(assignment_body(worker_id, patient_id, start, end, false)),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(list_assignments(&app, WORKER_TOKEN).await.len(), 2);
    }

    #[tokio::test]
    async fn recurring_batch_is_all_or_nothing() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        // Occupy the slot of the third weekly occurrence.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(16, 9, 0),
                    at(16, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let recurring = |ignore: bool| {
            let mut body = assignment_body(worker_id, patient_id, at(2, 9, 0), at(2, 10, 0), ignore);
            body["recurrence"] = json!({
                "frequency": "weekly",
                "interval": 1,
                "until": at(23, 23, 0).to_rfc3339(),
            });
            body
        };

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(recurring(false)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        // Nothing from the rejected batch was written.
        assert_eq!(list_assignments(&app, WORKER_TOKEN).await.len(), 1);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(recurring(true)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let created = json["data"].as_array().unwrap();
        assert_eq!(created.len(), 4); // Mar 2, 9, 16, 23

        let group_id = created[0]["recurrence_group_id"].as_str().unwrap();
        assert!(
            created
                .iter()
                .all(|row| row["recurrence_group_id"].as_str() == Some(group_id))
        );
    }

    #[tokio::test]
    async fn completing_an_assignment_records_worked_hours() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let pool = seeded.state.db().pool.clone();
        let app = super::router(seeded.state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        let assignment_id: Uuid = json["data"][0]["id"].as_str().unwrap().parse().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/complete"),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = WorkedHours::find_by_assignment(&pool, assignment_id)
            .await
            .unwrap()
            .expect("worked hours row");
        assert_eq!(record.start_at, at(2, 9, 0));
        assert_eq!(record.end_at, at(2, 10, 0));

        // Completed is terminal for the worker.
        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/cancel"),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // The admin may cancel it, which removes the realized time.
        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/cancel"),
                Some(ADMIN_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            WorkedHours::find_by_assignment(&pool, assignment_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn replan_is_admin_only() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        let assignment_id: Uuid = json["data"][0]["id"].as_str().unwrap().parse().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/cancel"),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/replan"),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/replan"),
                Some(ADMIN_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], json!("planned"));
    }

    #[tokio::test]
    async fn visitors_are_read_only_and_workers_schedule_only_themselves() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let other_worker_id = seeded.other_worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(VISITOR_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    other_worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 0),
                    false,
                )),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Reading is fine for visitors.
        let response = app
            .oneshot(request("GET", "/api/assignments", Some(VISITOR_TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bulk_actions_roll_back_on_first_failure() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        let mut ids = Vec::new();
        for day in [2, 3] {
            let response = app
                .clone()
                .oneshot(request(
                    "POST",
                    "/api/assignments",
                    Some(WORKER_TOKEN),
                    Some(assignment_body(
                        worker_id,
                        patient_id,
                        at(day, 9, 0),
                        at(day, 10, 0),
                        false,
                    )),
                ))
                .await
                .unwrap();
            let json = body_json(response).await;
            ids.push(json["data"][0]["id"].as_str().unwrap().to_string());
        }

        // Complete the first assignment so a second complete is invalid.
        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{}/complete", ids[0]),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/bulk/actions",
                Some(WORKER_TOKEN),
                Some(json!({
                    "action": "complete",
                    "items": [
                        {"kind": "assignment", "id": ids[0]},
                        {"kind": "assignment", "id": ids[1]},
                    ],
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // The second assignment was not completed by the failed batch.
        let rows = list_assignments(&app, WORKER_TOKEN).await;
        let second = rows
            .iter()
            .find(|row| row["id"].as_str() == Some(ids[1].as_str()))
            .unwrap();
        assert_eq!(second["status"], json!("planned"));

        // A clean batch goes through.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/bulk/actions",
                Some(WORKER_TOKEN),
                Some(json!({
                    "action": "cancel",
                    "items": [{"kind": "assignment", "id": ids[1]}],
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reports_and_admin_endpoints_require_admin() {
        let (_env_guard, seeded) = setup().await;
        let app = super::router(seeded.state);

        for uri in [
            "/api/reports?from=2026-03-01T00:00:00Z&to=2026-04-01T00:00:00Z",
            "/api/reports/active-months",
            "/api/admin/backup",
            "/api/admin/storage",
        ] {
            let response = app
                .clone()
                .oneshot(request("GET", uri, Some(WORKER_TOKEN), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri: {uri}");

            let response = app
                .clone()
                .oneshot(request("GET", uri, Some(ADMIN_TOKEN), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri: {uri}");
        }
    }

    #[tokio::test]
    async fn report_aggregates_realized_activity() {
        let (_env_guard, seeded) = setup().await;
        let worker_id = seeded.worker_id;
        let patient_id = seeded.patient_id;
        let app = super::router(seeded.state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/assignments",
                Some(WORKER_TOKEN),
                Some(assignment_body(
                    worker_id,
                    patient_id,
                    at(2, 9, 0),
                    at(2, 10, 30),
                    false,
                )),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        let assignment_id = json["data"][0]["id"].as_str().unwrap().to_string();

        app.clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/assignments/{assignment_id}/complete"),
                Some(WORKER_TOKEN),
                None,
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request(
                "GET",
                "/api/reports?from=2026-03-01T00:00:00Z&to=2026-04-01T00:00:00Z",
                Some(ADMIN_TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let workers = json["data"]["workers"].as_array().unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0]["worked_minutes"], json!(90));
        assert_eq!(workers[0]["pay_cents"], json!(90 * 2_000 / 60));
        assert_eq!(workers[0]["travel_cost_cents"], json!(300));
    }

    #[tokio::test]
    async fn backup_excludes_credentials() {
        let (_env_guard, seeded) = setup().await;
        let app = super::router(seeded.state);

        let response = app
            .oneshot(request("GET", "/api/admin/backup", Some(ADMIN_TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let users = json["data"]["users"].as_array().unwrap();
        assert!(!users.is_empty());
        for user in users {
            assert!(user.get("password_hash").is_none());
            assert!(user.get("password_salt").is_none());
        }
    }
}
