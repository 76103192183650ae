use sea_orm::entity::prelude::*;

use crate::types::VisitStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "assignments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub worker_id: i64,
    pub patient_id: i64,
    pub start_at: DateTimeUtc,
    pub end_at: DateTimeUtc,
    pub status: VisitStatus,
    pub recurrence_group_id: Option<Uuid>,
    pub recurring: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
