use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

pub use crate::types::ExpenseCategory;

use crate::{
    entities::expense,
    events::{
        EVENT_EXPENSE_CREATED, EVENT_EXPENSE_DELETED, EVENT_EXPENSE_UPDATED, ExpenseEventPayload,
    },
    models::{event_outbox::EventOutbox, ids},
};

#[derive(Debug, Error)]
pub enum ExpenseError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Expense not found")]
    ExpenseNotFound,
    #[error("{0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Expense {
    pub id: Uuid,
    pub label: String,
    pub amount_cents: i64,
    pub incurred_on: NaiveDate,
    pub category: Option<ExpenseCategory>,
    pub receipt_path: Option<String>,
    pub created_by: Option<Uuid>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateExpense {
    pub label: String,
    pub amount_cents: i64,
    pub incurred_on: NaiveDate,
    pub category: Option<ExpenseCategory>,
    pub receipt_path: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateExpense {
    pub label: Option<String>,
    pub amount_cents: Option<i64>,
    pub incurred_on: Option<NaiveDate>,
    pub category: Option<ExpenseCategory>,
    pub receipt_path: Option<String>,
}

impl Expense {
    async fn from_model<C: ConnectionTrait>(db: &C, model: expense::Model) -> Result<Self, DbErr> {
        let created_by = match model.created_by {
            Some(id) => ids::user_uuid_by_id(db, id).await?,
            None => None,
        };

        Ok(Self {
            id: model.uuid,
            label: model.label,
            amount_cents: model.amount_cents,
            incurred_on: model.incurred_on,
            category: model.category,
            receipt_path: model.receipt_path,
            created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = expense::Entity::find()
            .filter(expense::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_filtered<C: ConnectionTrait>(
        db: &C,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Self>, DbErr> {
        let mut query = expense::Entity::find();
        if let Some(from) = from {
            query = query.filter(expense::Column::IncurredOn.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(expense::Column::IncurredOn.lte(to));
        }

        let models = query
            .order_by_desc(expense::Column::IncurredOn)
            .all(db)
            .await?;

        let mut expenses = Vec::with_capacity(models.len());
        for model in models {
            expenses.push(Self::from_model(db, model).await?);
        }
        Ok(expenses)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateExpense,
        expense_id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<Self, ExpenseError> {
        if data.amount_cents < 0 {
            return Err(ExpenseError::ValidationError(
                "Expense amount cannot be negative".to_string(),
            ));
        }

        let created_by_row_id = match created_by {
            Some(user_id) => ids::user_id_by_uuid(db, user_id).await?,
            None => None,
        };

        let now = Utc::now();
        let active = expense::ActiveModel {
            uuid: Set(expense_id),
            label: Set(data.label.clone()),
            amount_cents: Set(data.amount_cents),
            incurred_on: Set(data.incurred_on),
            category: Set(data.category.clone()),
            receipt_path: Set(data.receipt_path.clone()),
            created_by: Set(created_by_row_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(ExpenseEventPayload { expense_id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_EXPENSE_CREATED, "expense", expense_id, payload).await?;
        Self::from_model(db, model).await.map_err(Into::into)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateExpense,
    ) -> Result<Self, ExpenseError> {
        if let Some(amount_cents) = data.amount_cents
            && amount_cents < 0
        {
            return Err(ExpenseError::ValidationError(
                "Expense amount cannot be negative".to_string(),
            ));
        }

        let record = expense::Entity::find()
            .filter(expense::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(ExpenseError::ExpenseNotFound)?;

        let mut active: expense::ActiveModel = record.into();
        if let Some(label) = &data.label {
            active.label = Set(label.clone());
        }
        if let Some(amount_cents) = data.amount_cents {
            active.amount_cents = Set(amount_cents);
        }
        if let Some(incurred_on) = data.incurred_on {
            active.incurred_on = Set(incurred_on);
        }
        if let Some(category) = &data.category {
            active.category = Set(Some(category.clone()));
        }
        if let Some(receipt_path) = &data.receipt_path {
            active.receipt_path = Set(Some(receipt_path.clone()));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(ExpenseEventPayload { expense_id: id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_EXPENSE_UPDATED, "expense", id, payload).await?;
        Self::from_model(db, updated).await.map_err(Into::into)
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = expense::Entity::delete_many()
            .filter(expense::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(ExpenseEventPayload { expense_id: id })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_EXPENSE_DELETED, "expense", id, payload).await?;
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

    fn expense_on(day: u32) -> CreateExpense {
        CreateExpense {
            label: "Fuel".to_string(),
            amount_cents: 4_250,
            incurred_on: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            category: Some(ExpenseCategory::Travel),
            receipt_path: None,
        }
    }

    #[tokio::test]
    async fn date_filter_bounds_are_inclusive() {
        let db = setup_db().await;
        Expense::create(&db, &expense_on(1), Uuid::new_v4(), None)
            .await
            .unwrap();
        Expense::create(&db, &expense_on(15), Uuid::new_v4(), None)
            .await
            .unwrap();
        Expense::create(&db, &expense_on(31), Uuid::new_v4(), None)
            .await
            .unwrap();

        let range = Expense::find_filtered(
            &db,
            NaiveDate::from_ymd_opt(2026, 3, 1),
            NaiveDate::from_ymd_opt(2026, 3, 15),
        )
        .await
        .unwrap();
        assert_eq!(range.len(), 2);
    }

    #[tokio::test]
    async fn negative_amounts_are_rejected() {
        let db = setup_db().await;
        let mut data = expense_on(1);
        data.amount_cents = -1;
        let err = Expense::create(&db, &data, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExpenseError::ValidationError(_)));
    }
}
