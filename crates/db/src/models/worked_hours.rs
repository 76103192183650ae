use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::worked_hours,
    models::{assignment::Assignment, ids},
};

#[derive(Debug, Error)]
pub enum WorkedHoursError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Assignment not found")]
    AssignmentNotFound,
    #[error("Worker not found")]
    WorkerNotFound,
}

/// Realized time, recorded 1:1 with a completed assignment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct WorkedHours {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub worker_id: Uuid,
    #[ts(type = "Date")]
    pub start_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub end_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
}

impl WorkedHours {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: worked_hours::Model,
    ) -> Result<Self, DbErr> {
        let assignment_id = ids::assignment_uuid_by_id(db, model.assignment_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Assignment not found".to_string()))?;
        let worker_id = ids::user_uuid_by_id(db, model.worker_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Worker not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            assignment_id,
            worker_id,
            start_at: model.start_at,
            end_at: model.end_at,
            created_at: model.created_at,
        })
    }

    /// Records realized time for a completed assignment, copying its interval.
    pub async fn create_for_assignment<C: ConnectionTrait>(
        db: &C,
        assignment: &Assignment,
    ) -> Result<Self, WorkedHoursError> {
        let assignment_row_id = ids::assignment_id_by_uuid(db, assignment.id)
            .await?
            .ok_or(WorkedHoursError::AssignmentNotFound)?;
        let worker_row_id = ids::user_id_by_uuid(db, assignment.worker_id)
            .await?
            .ok_or(WorkedHoursError::WorkerNotFound)?;

        let active = worked_hours::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            assignment_id: Set(assignment_row_id),
            worker_id: Set(worker_row_id),
            start_at: Set(assignment.start_at),
            end_at: Set(assignment.end_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Ok(Self::from_model(db, model).await?)
    }

    pub async fn find_by_assignment<C: ConnectionTrait>(
        db: &C,
        assignment_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let Some(assignment_row_id) = ids::assignment_id_by_uuid(db, assignment_id).await? else {
            return Ok(None);
        };

        let record = worked_hours::Entity::find()
            .filter(worked_hours::Column::AssignmentId.eq(assignment_row_id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn delete_by_assignment<C: ConnectionTrait>(
        db: &C,
        assignment_id: Uuid,
    ) -> Result<u64, DbErr> {
        let Some(assignment_row_id) = ids::assignment_id_by_uuid(db, assignment_id).await? else {
            return Ok(0);
        };

        let result = worked_hours::Entity::delete_many()
            .filter(worked_hours::Column::AssignmentId.eq(assignment_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// All realized time intersecting `[from, to)`, ordered by start.
    pub async fn find_in_range<C: ConnectionTrait>(
        db: &C,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let models = worked_hours::Entity::find()
            .filter(worked_hours::Column::StartAt.lt(to))
            .filter(worked_hours::Column::EndAt.gt(from))
            .order_by_asc(worked_hours::Column::StartAt)
            .all(db)
            .await?;

        let mut records = Vec::with_capacity(models.len());
        for model in models {
            records.push(Self::from_model(db, model).await?);
        }
        Ok(records)
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let models = worked_hours::Entity::find()
            .order_by_asc(worked_hours::Column::StartAt)
            .all(db)
            .await?;

        let mut records = Vec::with_capacity(models.len());
        for model in models {
            records.push(Self::from_model(db, model).await?);
        }
        Ok(records)
    }
}
