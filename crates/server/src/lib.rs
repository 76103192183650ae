use db::{DBService, DbErr};
use serde::Serialize;
use ts_rs::TS;

pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
#[cfg(test)]
pub mod test_support;

const SESSION_TTL_ENV: &str = "CAREPLAN_SESSION_TTL_SECS";
const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;

/// The user resolved from the request's session token, attached to every
/// authenticated request as an extension.
#[derive(Debug, Clone, Serialize, TS)]
pub struct AuthUser {
    #[serde(flatten)]
    #[ts(flatten)]
    pub user: db::models::user::User,
    #[serde(skip)]
    #[ts(skip)]
    pub token: String,
}

impl std::ops::Deref for AuthUser {
    type Target = db::models::user::User;
    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

#[derive(Clone)]
pub struct AppState {
    db: DBService,
    session_ttl_secs: i64,
}

impl AppState {
    pub async fn new() -> Result<Self, DbErr> {
        let session_ttl_secs = std::env::var(SESSION_TTL_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        Ok(Self {
            db: DBService::new().await?,
            session_ttl_secs,
        })
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_secs
    }
}
