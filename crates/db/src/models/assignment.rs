use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

pub use crate::types::VisitStatus;

use crate::{
    entities::assignment,
    events::{
        AssignmentEventPayload, EVENT_ASSIGNMENT_CREATED, EVENT_ASSIGNMENT_DELETED,
        EVENT_ASSIGNMENT_UPDATED,
    },
    models::{event_outbox::EventOutbox, ids},
};

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Assignment not found")]
    AssignmentNotFound,
    #[error("Worker not found")]
    WorkerNotFound,
    #[error("Patient not found")]
    PatientNotFound,
    #[error("{0}")]
    ValidationError(String),
}

/// The actor dimension an interval is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapActor {
    Worker(Uuid),
    Patient(Uuid),
}

impl OverlapActor {
    pub fn dimension(&self) -> &'static str {
        match self {
            OverlapActor::Worker(_) => "worker",
            OverlapActor::Patient(_) => "patient",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Assignment {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub patient_id: Uuid,
    #[ts(type = "Date")]
    pub start_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub end_at: DateTime<Utc>,
    pub status: VisitStatus,
    pub recurrence_group_id: Option<Uuid>,
    pub recurring: bool,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateAssignment {
    pub worker_id: Uuid,
    pub patient_id: Uuid,
    #[ts(type = "Date")]
    pub start_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateAssignment {
    pub worker_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    #[ts(type = "Date")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
pub struct AssignmentFilter {
    pub worker_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Assignment {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: assignment::Model,
    ) -> Result<Self, DbErr> {
        let worker_id = ids::user_uuid_by_id(db, model.worker_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;
        let patient_id = ids::patient_uuid_by_id(db, model.patient_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Patient not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            worker_id,
            patient_id,
            start_at: model.start_at,
            end_at: model.end_at,
            status: model.status,
            recurrence_group_id: model.recurrence_group_id,
            recurring: model.recurring,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = assignment::Entity::find()
            .filter(assignment::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_filtered<C: ConnectionTrait>(
        db: &C,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Self>, DbErr> {
        let mut query = assignment::Entity::find();

        if let Some(worker_id) = filter.worker_id {
            let worker_row_id = ids::user_id_by_uuid(db, worker_id)
                .await?
                .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;
            query = query.filter(assignment::Column::WorkerId.eq(worker_row_id));
        }
        if let Some(patient_id) = filter.patient_id {
            let patient_row_id = ids::patient_id_by_uuid(db, patient_id)
                .await?
                .ok_or(DbErr::RecordNotFound("Patient not found".to_string()))?;
            query = query.filter(assignment::Column::PatientId.eq(patient_row_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(assignment::Column::EndAt.gt(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(assignment::Column::StartAt.lt(to));
        }

        let models = query
            .order_by_asc(assignment::Column::StartAt)
            .all(db)
            .await?;

        let mut assignments = Vec::with_capacity(models.len());
        for model in models {
            assignments.push(Self::from_model(db, model).await?);
        }
        Ok(assignments)
    }

    pub async fn find_by_recurrence_group<C: ConnectionTrait>(
        db: &C,
        group_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let models = assignment::Entity::find()
            .filter(assignment::Column::RecurrenceGroupId.eq(group_id))
            .order_by_asc(assignment::Column::StartAt)
            .all(db)
            .await?;

        let mut assignments = Vec::with_capacity(models.len());
        for model in models {
            assignments.push(Self::from_model(db, model).await?);
        }
        Ok(assignments)
    }

    /// Half-open interval conflict scan: a non-cancelled assignment of the
    /// same actor conflicts iff `existing.start < end && existing.end > start`.
    /// Touching boundaries do not conflict. `exclude` skips the record's own
    /// id on update paths.
    pub async fn find_overlapping<C: ConnectionTrait>(
        db: &C,
        actor: OverlapActor,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Option<Self>, AssignmentError> {
        let actor_condition = match actor {
            OverlapActor::Worker(worker_id) => {
                let worker_row_id = ids::user_id_by_uuid(db, worker_id)
                    .await?
                    .ok_or(AssignmentError::WorkerNotFound)?;
                Condition::all().add(assignment::Column::WorkerId.eq(worker_row_id))
            }
            OverlapActor::Patient(patient_id) => {
                let patient_row_id = ids::patient_id_by_uuid(db, patient_id)
                    .await?
                    .ok_or(AssignmentError::PatientNotFound)?;
                Condition::all().add(assignment::Column::PatientId.eq(patient_row_id))
            }
        };

        let mut query = assignment::Entity::find()
            .filter(actor_condition)
            .filter(assignment::Column::Status.ne(VisitStatus::Cancelled))
            .filter(assignment::Column::StartAt.lt(end_at))
            .filter(assignment::Column::EndAt.gt(start_at));

        if let Some(exclude) = exclude {
            query = query.filter(assignment::Column::Uuid.ne(exclude));
        }

        let record = query
            .order_by_asc(assignment::Column::StartAt)
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateAssignment,
        assignment_id: Uuid,
        recurrence_group_id: Option<Uuid>,
    ) -> Result<Self, AssignmentError> {
        if data.start_at >= data.end_at {
            return Err(AssignmentError::ValidationError(
                "Assignment must start before it ends".to_string(),
            ));
        }

        let worker_row_id = ids::user_id_by_uuid(db, data.worker_id)
            .await?
            .ok_or(AssignmentError::WorkerNotFound)?;
        let patient_row_id = ids::patient_id_by_uuid(db, data.patient_id)
            .await?
            .ok_or(AssignmentError::PatientNotFound)?;

        let now = Utc::now();
        let active = assignment::ActiveModel {
            uuid: Set(assignment_id),
            worker_id: Set(worker_row_id),
            patient_id: Set(patient_row_id),
            start_at: Set(data.start_at),
            end_at: Set(data.end_at),
            status: Set(VisitStatus::Planned),
            recurrence_group_id: Set(recurrence_group_id),
            recurring: Set(recurrence_group_id.is_some()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(AssignmentEventPayload {
            assignment_id,
            worker_id: data.worker_id,
            patient_id: data.patient_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_ASSIGNMENT_CREATED, "assignment", assignment_id, payload)
            .await?;
        Self::from_model(db, model).await.map_err(Into::into)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        worker_id: Uuid,
        patient_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, AssignmentError> {
        if start_at >= end_at {
            return Err(AssignmentError::ValidationError(
                "Assignment must start before it ends".to_string(),
            ));
        }

        let worker_row_id = ids::user_id_by_uuid(db, worker_id)
            .await?
            .ok_or(AssignmentError::WorkerNotFound)?;
        let patient_row_id = ids::patient_id_by_uuid(db, patient_id)
            .await?
            .ok_or(AssignmentError::PatientNotFound)?;

        let record = assignment::Entity::find()
            .filter(assignment::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(AssignmentError::AssignmentNotFound)?;

        let mut active: assignment::ActiveModel = record.into();
        active.worker_id = Set(worker_row_id);
        active.patient_id = Set(patient_row_id);
        active.start_at = Set(start_at);
        active.end_at = Set(end_at);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(AssignmentEventPayload {
            assignment_id: id,
            worker_id,
            patient_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_ASSIGNMENT_UPDATED, "assignment", id, payload).await?;
        Self::from_model(db, updated).await.map_err(Into::into)
    }

    pub async fn set_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status: VisitStatus,
    ) -> Result<Self, AssignmentError> {
        let record = assignment::Entity::find()
            .filter(assignment::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(AssignmentError::AssignmentNotFound)?;

        let mut active: assignment::ActiveModel = record.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let assignment = Self::from_model(db, updated).await?;
        let payload = serde_json::to_value(AssignmentEventPayload {
            assignment_id: id,
            worker_id: assignment.worker_id,
            patient_id: assignment.patient_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_ASSIGNMENT_UPDATED, "assignment", id, payload).await?;
        Ok(assignment)
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let record = assignment::Entity::find()
            .filter(assignment::Column::Uuid.eq(id))
            .one(db)
            .await?;

        let Some(record) = record else {
            return Ok(0);
        };

        let worker_id = ids::user_uuid_by_id(db, record.worker_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;
        let patient_id = ids::patient_uuid_by_id(db, record.patient_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Patient not found".to_string()))?;

        let result = assignment::Entity::delete_many()
            .filter(assignment::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(AssignmentEventPayload {
                assignment_id: id,
                worker_id,
                patient_id,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_ASSIGNMENT_DELETED, "assignment", id, payload).await?;
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
    use crate::models::{
        patient::{CreatePatient, Patient},
        user::{CreateUser, User, UserRole},
    };

    async fn setup() -> (sea_orm::DatabaseConnection, Uuid, Uuid) {
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

        let patient_id = Uuid::new_v4();
        Patient::create(
            &db,
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

        (db, worker_id, patient_id)
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, min, 0).unwrap()
    }

    async fn create_at(
        db: &sea_orm::DatabaseConnection,
        worker_id: Uuid,
        patient_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Assignment {
        Assignment::create(
            db,
            &CreateAssignment {
                worker_id,
                patient_id,
                start_at: start,
                end_at: end,
            },
            Uuid::new_v4(),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn overlap_uses_half_open_intervals() {
        let (db, worker_id, patient_id) = setup().await;
        create_at(&db, worker_id, patient_id, at(9, 0), at(10, 0)).await;

        // 09:30-10:30 intersects 09:00-10:00.
        let hit = Assignment::find_overlapping(
            &db,
            OverlapActor::Worker(worker_id),
            at(9, 30),
            at(10, 30),
            None,
        )
        .await
        .unwrap();
        assert!(hit.is_some());

        // 10:00-11:00 only touches the boundary: no conflict.
        let adjacent = Assignment::find_overlapping(
            &db,
            OverlapActor::Worker(worker_id),
            at(10, 0),
            at(11, 0),
            None,
        )
        .await
        .unwrap();
        assert!(adjacent.is_none());
    }

    #[tokio::test]
    async fn overlap_checks_both_dimensions_independently() {
        let (db, worker_id, patient_id) = setup().await;
        create_at(&db, worker_id, patient_id, at(9, 0), at(10, 0)).await;

        let patient_hit = Assignment::find_overlapping(
            &db,
            OverlapActor::Patient(patient_id),
            at(9, 30),
            at(10, 30),
            None,
        )
        .await
        .unwrap();
        assert!(patient_hit.is_some());
    }

    #[tokio::test]
    async fn cancelled_assignments_do_not_conflict() {
        let (db, worker_id, patient_id) = setup().await;
        let assignment = create_at(&db, worker_id, patient_id, at(9, 0), at(10, 0)).await;
        Assignment::set_status(&db, assignment.id, VisitStatus::Cancelled)
            .await
            .unwrap();

        let hit = Assignment::find_overlapping(
            &db,
            OverlapActor::Worker(worker_id),
            at(9, 0),
            at(10, 0),
            None,
        )
        .await
        .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn exclusion_prevents_self_conflict_on_update() {
        let (db, worker_id, patient_id) = setup().await;
        let assignment = create_at(&db, worker_id, patient_id, at(9, 0), at(10, 0)).await;

        let without_exclude = Assignment::find_overlapping(
            &db,
            OverlapActor::Worker(worker_id),
            at(9, 0),
            at(10, 0),
            None,
        )
        .await
        .unwrap();
        assert!(without_exclude.is_some());

        let with_exclude = Assignment::find_overlapping(
            &db,
            OverlapActor::Worker(worker_id),
            at(9, 0),
            at(10, 0),
            Some(assignment.id),
        )
        .await
        .unwrap();
        assert!(with_exclude.is_none());
    }

    #[tokio::test]
    async fn create_rejects_inverted_interval() {
        let (db, worker_id, patient_id) = setup().await;
        let err = Assignment::create(
            &db,
            &CreateAssignment {
                worker_id,
                patient_id,
                start_at: at(10, 0),
                end_at: at(9, 0),
            },
            Uuid::new_v4(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AssignmentError::ValidationError(_)));
    }
}
