use sea_orm::entity::prelude::*;

use crate::types::VisitStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "appointments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub subject: String,
    pub location: Option<String>,
    pub worker_id: i64,
    pub start_at: DateTimeUtc,
    pub end_at: DateTimeUtc,
    pub status: VisitStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
