use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{appointment, assignment, expense, patient, user};

pub async fn user_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_uuid_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Uuid>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Uuid)
        .filter(user::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn patient_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    patient::Entity::find()
        .select_only()
        .column(patient::Column::Id)
        .filter(patient::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn patient_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    patient::Entity::find()
        .select_only()
        .column(patient::Column::Uuid)
        .filter(patient::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn assignment_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    assignment::Entity::find()
        .select_only()
        .column(assignment::Column::Id)
        .filter(assignment::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn assignment_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    assignment::Entity::find()
        .select_only()
        .column(assignment::Column::Uuid)
        .filter(assignment::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn appointment_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    appointment::Entity::find()
        .select_only()
        .column(appointment::Column::Id)
        .filter(appointment::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn expense_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    expense::Entity::find()
        .select_only()
        .column(expense::Column::Id)
        .filter(expense::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}
