use db::types::UserRole;

use crate::{AuthUser, error::ApiError};

pub mod admin;
pub mod appointments;
pub mod assignments;
pub mod auth;
pub mod bulk;
pub mod expenses;
pub mod health;
pub mod patients;
pub mod reports;
pub mod users;

pub(crate) fn require_admin(auth: &AuthUser) -> Result<(), ApiError> {
    if auth.role == UserRole::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Administrator access required".to_string(),
        ))
    }
}

/// Visitors are read-only; any write endpoint rejects them up front.
pub(crate) fn forbid_visitor(auth: &AuthUser) -> Result<(), ApiError> {
    if auth.role == UserRole::Visitor {
        Err(ApiError::Forbidden(
            "Visitors have read-only access".to_string(),
        ))
    } else {
        Ok(())
    }
}
