use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

pub use crate::types::VisitStatus;

use crate::{
    entities::appointment,
    events::{
        AppointmentEventPayload, EVENT_APPOINTMENT_CREATED, EVENT_APPOINTMENT_DELETED,
        EVENT_APPOINTMENT_UPDATED,
    },
    models::{event_outbox::EventOutbox, ids},
};

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Appointment not found")]
    AppointmentNotFound,
    #[error("Worker not found")]
    WorkerNotFound,
    #[error("{0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Appointment {
    pub id: Uuid,
    pub subject: String,
    pub location: Option<String>,
    pub worker_id: Uuid,
    #[ts(type = "Date")]
    pub start_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub end_at: DateTime<Utc>,
    pub status: VisitStatus,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateAppointment {
    pub subject: String,
    pub location: Option<String>,
    pub worker_id: Uuid,
    #[ts(type = "Date")]
    pub start_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateAppointment {
    pub subject: Option<String>,
    pub location: Option<String>,
    pub worker_id: Option<Uuid>,
    #[ts(type = "Date")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub end_at: Option<DateTime<Utc>>,
}

impl Appointment {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: appointment::Model,
    ) -> Result<Self, DbErr> {
        let worker_id = ids::user_uuid_by_id(db, model.worker_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            subject: model.subject,
            location: model.location,
            worker_id,
            start_at: model.start_at,
            end_at: model.end_at,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = appointment::Entity::find()
            .filter(appointment::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_filtered<C: ConnectionTrait>(
        db: &C,
        worker_id: Option<Uuid>,
    ) -> Result<Vec<Self>, DbErr> {
        let mut query = appointment::Entity::find();

        if let Some(worker_id) = worker_id {
            let worker_row_id = ids::user_id_by_uuid(db, worker_id)
                .await?
                .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;
            query = query.filter(appointment::Column::WorkerId.eq(worker_row_id));
        }

        let models = query
            .order_by_asc(appointment::Column::StartAt)
            .all(db)
            .await?;

        let mut appointments = Vec::with_capacity(models.len());
        for model in models {
            appointments.push(Self::from_model(db, model).await?);
        }
        Ok(appointments)
    }

    /// Worker-dimension conflict scan against other appointments, half-open
    /// semantics, optional self-exclusion for update paths.
    pub async fn find_overlapping<C: ConnectionTrait>(
        db: &C,
        worker_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Option<Self>, AppointmentError> {
        let worker_row_id = ids::user_id_by_uuid(db, worker_id)
            .await?
            .ok_or(AppointmentError::WorkerNotFound)?;

        let mut query = appointment::Entity::find()
            .filter(appointment::Column::WorkerId.eq(worker_row_id))
            .filter(appointment::Column::Status.ne(VisitStatus::Cancelled))
            .filter(appointment::Column::StartAt.lt(end_at))
            .filter(appointment::Column::EndAt.gt(start_at));

        if let Some(exclude) = exclude {
            query = query.filter(appointment::Column::Uuid.ne(exclude));
        }

        let record = query
            .order_by_asc(appointment::Column::StartAt)
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateAppointment,
        appointment_id: Uuid,
    ) -> Result<Self, AppointmentError> {
        if data.start_at >= data.end_at {
            return Err(AppointmentError::ValidationError(
                "Appointment must start before it ends".to_string(),
            ));
        }

        let worker_row_id = ids::user_id_by_uuid(db, data.worker_id)
            .await?
            .ok_or(AppointmentError::WorkerNotFound)?;

        let now = Utc::now();
        let active = appointment::ActiveModel {
            uuid: Set(appointment_id),
            subject: Set(data.subject.clone()),
            location: Set(data.location.clone()),
            worker_id: Set(worker_row_id),
            start_at: Set(data.start_at),
            end_at: Set(data.end_at),
            status: Set(VisitStatus::Planned),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(AppointmentEventPayload {
            appointment_id,
            worker_id: data.worker_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(
            db,
            EVENT_APPOINTMENT_CREATED,
            "appointment",
            appointment_id,
            payload,
        )
        .await?;
        Self::from_model(db, model).await.map_err(Into::into)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        subject: String,
        location: Option<String>,
        worker_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, AppointmentError> {
        if start_at >= end_at {
            return Err(AppointmentError::ValidationError(
                "Appointment must start before it ends".to_string(),
            ));
        }

        let worker_row_id = ids::user_id_by_uuid(db, worker_id)
            .await?
            .ok_or(AppointmentError::WorkerNotFound)?;

        let record = appointment::Entity::find()
            .filter(appointment::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound)?;

        let mut active: appointment::ActiveModel = record.into();
        active.subject = Set(subject);
        active.location = Set(location);
        active.worker_id = Set(worker_row_id);
        active.start_at = Set(start_at);
        active.end_at = Set(end_at);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(AppointmentEventPayload {
            appointment_id: id,
            worker_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_APPOINTMENT_UPDATED, "appointment", id, payload).await?;
        Self::from_model(db, updated).await.map_err(Into::into)
    }

    pub async fn set_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status: VisitStatus,
    ) -> Result<Self, AppointmentError> {
        let record = appointment::Entity::find()
            .filter(appointment::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound)?;

        let mut active: appointment::ActiveModel = record.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let appointment = Self::from_model(db, updated).await?;
        let payload = serde_json::to_value(AppointmentEventPayload {
            appointment_id: id,
            worker_id: appointment.worker_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_APPOINTMENT_UPDATED, "appointment", id, payload).await?;
        Ok(appointment)
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let record = appointment::Entity::find()
            .filter(appointment::Column::Uuid.eq(id))
            .one(db)
            .await?;

        let Some(record) = record else {
            return Ok(0);
        };

        let worker_id = ids::user_uuid_by_id(db, record.worker_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;

        let result = appointment::Entity::delete_many()
            .filter(appointment::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(AppointmentEventPayload {
                appointment_id: id,
                worker_id,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_APPOINTMENT_DELETED, "appointment", id, payload).await?;
        }

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::user::{CreateUser, User, UserRole};

    async fn setup() -> (sea_orm::DatabaseConnection, Uuid) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();

        let worker_id = Uuid::new_v4();
        User::create(
            &db,
            &CreateUser {
                first_name: "Ada".to_string(),
                last_name: "Martin".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
                password_salt: "salt".to_string(),
                role: UserRole::Worker,
                hourly_rate_cents: 2_000,
                travel_cost_cents: 0,
            },
            worker_id,
        )
        .await
        .unwrap();

        (db, worker_id)
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, min, 0).unwrap()
    }

    #[tokio::test]
    async fn appointment_overlap_is_scoped_to_the_worker() {
        let (db, worker_id) = setup().await;

        Appointment::create(
            &db,
            &CreateAppointment {
                subject: "Team meeting".to_string(),
                location: Some("Office".to_string()),
                worker_id,
                start_at: at(14, 0),
                end_at: at(15, 0),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let hit = Appointment::find_overlapping(&db, worker_id, at(14, 30), at(15, 30), None)
            .await
            .unwrap();
        assert!(hit.is_some());

        let adjacent = Appointment::find_overlapping(&db, worker_id, at(15, 0), at(16, 0), None)
            .await
            .unwrap();
        assert!(adjacent.is_none());
    }
}
