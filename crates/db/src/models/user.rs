use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

pub use crate::types::UserRole;

use crate::{
    entities::user,
    events::{EVENT_USER_CREATED, EVENT_USER_DELETED, EVENT_USER_UPDATED, UserEventPayload},
    models::event_outbox::EventOutbox,
};

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("User not found")]
    UserNotFound,
    #[error("A user with this email already exists")]
    EmailTaken,
}

/// Public view of a user. Credential columns never leave the model layer
/// through this struct.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub hourly_rate_cents: i64,
    pub travel_cost_cents: i64,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub role: UserRole,
    pub hourly_rate_cents: i64,
    pub travel_cost_cents: i64,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub hourly_rate_cents: Option<i64>,
    pub travel_cost_cents: Option<i64>,
}

/// Credential columns for the login path.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub password_hash: String,
    pub password_salt: String,
}

impl User {
    pub(crate) fn from_model(model: user::Model) -> Self {
        Self {
            id: model.uuid,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            role: model.role,
            hourly_rate_cents: model.hourly_rate_cents,
            travel_cost_cents: model.travel_cost_cents,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn count<C: ConnectionTrait>(db: &C) -> Result<i64, DbErr> {
        let count = user::Entity::find().count(db).await?;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = user::Entity::find()
            .order_by_asc(user::Column::LastName)
            .order_by_asc(user::Column::FirstName)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_workers<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Worker))
            .order_by_asc(user::Column::LastName)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_email_with_credentials<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> Result<Option<(Self, UserCredentials)>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(db)
            .await?;

        Ok(record.map(|model| {
            let credentials = UserCredentials {
                password_hash: model.password_hash.clone(),
                password_salt: model.password_salt.clone(),
            };
            (Self::from_model(model), credentials)
        }))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateUser,
        user_id: Uuid,
    ) -> Result<Self, UserError> {
        let email_taken = user::Entity::find()
            .filter(user::Column::Email.eq(data.email.as_str()))
            .one(db)
            .await?
            .is_some();
        if email_taken {
            return Err(UserError::EmailTaken);
        }

        let now = Utc::now();
        let active = user::ActiveModel {
            uuid: Set(user_id),
            first_name: Set(data.first_name.clone()),
            last_name: Set(data.last_name.clone()),
            email: Set(data.email.clone()),
            password_hash: Set(data.password_hash.clone()),
            password_salt: Set(data.password_salt.clone()),
            role: Set(data.role.clone()),
            hourly_rate_cents: Set(data.hourly_rate_cents),
            travel_cost_cents: Set(data.travel_cost_cents),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(UserEventPayload { user_id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_USER_CREATED, "user", user_id, payload).await?;
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateUser,
    ) -> Result<Self, UserError> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(UserError::UserNotFound)?;

        if let Some(email) = data.email.as_deref()
            && email != record.email
        {
            let email_taken = user::Entity::find()
                .filter(user::Column::Email.eq(email))
                .filter(user::Column::Uuid.ne(id))
                .one(db)
                .await?
                .is_some();
            if email_taken {
                return Err(UserError::EmailTaken);
            }
        }

        let mut active: user::ActiveModel = record.into();
        if let Some(first_name) = &data.first_name {
            active.first_name = Set(first_name.clone());
        }
        if let Some(last_name) = &data.last_name {
            active.last_name = Set(last_name.clone());
        }
        if let Some(email) = &data.email {
            active.email = Set(email.clone());
        }
        if let Some(role) = &data.role {
            active.role = Set(role.clone());
        }
        if let Some(hourly_rate_cents) = data.hourly_rate_cents {
            active.hourly_rate_cents = Set(hourly_rate_cents);
        }
        if let Some(travel_cost_cents) = data.travel_cost_cents {
            active.travel_cost_cents = Set(travel_cost_cents);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(UserEventPayload { user_id: id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_USER_UPDATED, "user", id, payload).await?;
        Ok(Self::from_model(updated))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = user::Entity::delete_many()
            .filter(user::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(UserEventPayload { user_id: id })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_USER_DELETED, "user", id, payload).await?;
        }

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    fn worker_data(email: &str) -> CreateUser {
        CreateUser {
            first_name: "Ada".to_string(),
            last_name: "Martin".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            password_salt: "salt".to_string(),
            role: UserRole::Worker,
            hourly_rate_cents: 2_000,
            travel_cost_cents: 350,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let db = setup_db().await;

        User::create(&db, &worker_data("ada@example.com"), Uuid::new_v4())
            .await
            .unwrap();
        let err = User::create(&db, &worker_data("ada@example.com"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::EmailTaken));
    }

    #[tokio::test]
    async fn update_changes_rates_and_role() {
        let db = setup_db().await;
        let user_id = Uuid::new_v4();
        User::create(&db, &worker_data("ada@example.com"), user_id)
            .await
            .unwrap();

        let updated = User::update(
            &db,
            user_id,
            &UpdateUser {
                first_name: None,
                last_name: None,
                email: None,
                role: Some(UserRole::Admin),
                hourly_rate_cents: Some(2_500),
                travel_cost_cents: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.role, UserRole::Admin);
        assert_eq!(updated.hourly_rate_cents, 2_500);
        assert_eq!(updated.travel_cost_cents, 350);
    }
}
