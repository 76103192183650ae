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
    entities::patient,
    events::{
        EVENT_PATIENT_CREATED, EVENT_PATIENT_DELETED, EVENT_PATIENT_UPDATED, PatientEventPayload,
    },
    models::event_outbox::EventOutbox,
};

#[derive(Debug, Error)]
pub enum PatientError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Patient not found")]
    PatientNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreatePatient {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdatePatient {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl Patient {
    pub(crate) fn from_model(model: patient::Model) -> Self {
        Self {
            id: model.uuid,
            first_name: model.first_name,
            last_name: model.last_name,
            address: model.address,
            phone: model.phone,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = patient::Entity::find()
            .order_by_asc(patient::Column::LastName)
            .order_by_asc(patient::Column::FirstName)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = patient::Entity::find()
            .filter(patient::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreatePatient,
        patient_id: Uuid,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = patient::ActiveModel {
            uuid: Set(patient_id),
            first_name: Set(data.first_name.clone()),
            last_name: Set(data.last_name.clone()),
            address: Set(data.address.clone()),
            phone: Set(data.phone.clone()),
            notes: Set(data.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(PatientEventPayload { patient_id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_PATIENT_CREATED, "patient", patient_id, payload).await?;
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdatePatient,
    ) -> Result<Self, PatientError> {
        let record = patient::Entity::find()
            .filter(patient::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(PatientError::PatientNotFound)?;

        let mut active: patient::ActiveModel = record.into();
        if let Some(first_name) = &data.first_name {
            active.first_name = Set(first_name.clone());
        }
        if let Some(last_name) = &data.last_name {
            active.last_name = Set(last_name.clone());
        }
        if let Some(address) = &data.address {
            active.address = Set(address.clone());
        }
        if let Some(phone) = &data.phone {
            active.phone = Set(Some(phone.clone()));
        }
        if let Some(notes) = &data.notes {
            active.notes = Set(Some(notes.clone()));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(PatientEventPayload { patient_id: id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_PATIENT_UPDATED, "patient", id, payload).await?;
        Ok(Self::from_model(updated))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = patient::Entity::delete_many()
            .filter(patient::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(PatientEventPayload { patient_id: id })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_PATIENT_DELETED, "patient", id, payload).await?;
        }

        Ok(result.rows_affected)
    }
}
