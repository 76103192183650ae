use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::{session, user},
    models::{ids, user::User},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Session not found")]
    NotFound,
    #[error("User not found")]
    UserNotFound,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    async fn from_model<C: ConnectionTrait>(db: &C, model: session::Model) -> Result<Self, DbErr> {
        let user_uuid = ids::user_uuid_by_id(db, model.user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            user_id: user_uuid,
            token: model.token,
            expires_at: model.expires_at,
            created_at: model.created_at,
        })
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        token: &str,
        ttl_secs: i64,
    ) -> Result<Self, SessionError> {
        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        let now = Utc::now();
        let active = session::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            user_id: Set(user_row_id),
            token: Set(token.to_string()),
            expires_at: Set(now + Duration::seconds(ttl_secs)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Ok(Self::from_model(db, model).await?)
    }

    /// Resolves a presented bearer token into the session and its user.
    /// Expired sessions resolve to None.
    pub async fn find_user_by_token<C: ConnectionTrait>(
        db: &C,
        token: &str,
    ) -> Result<Option<(Self, User)>, DbErr> {
        let record = session::Entity::find()
            .filter(session::Column::Token.eq(token))
            .filter(session::Column::ExpiresAt.gt(Utc::now()))
            .one(db)
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let user_row = user::Entity::find_by_id(record.user_id).one(db).await?;
        let Some(user_row) = user_row else {
            tracing::warn!(session = %record.uuid, "Session points at a deleted user");
            return Ok(None);
        };
        let user = User::from_model(user_row);

        let session = Self::from_model(db, record).await?;
        Ok(Some((session, user)))
    }

    pub async fn delete_by_token<C: ConnectionTrait>(db: &C, token: &str) -> Result<u64, DbErr> {
        let result = session::Entity::delete_many()
            .filter(session::Column::Token.eq(token))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn prune_expired<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        let result = session::Entity::delete_many()
            .filter(session::Column::ExpiresAt.lte(Utc::now()))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
