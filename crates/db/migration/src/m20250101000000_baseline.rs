use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Users::Table)
                    .col(pk_id_col(manager, Users::Id))
                    .col(uuid_col(Users::Uuid))
                    .col(ColumnDef::new(Users::FirstName).string().not_null())
                    .col(ColumnDef::new(Users::LastName).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::PasswordSalt).string().not_null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(16)
                            .not_null()
                            .default(Expr::val("worker")),
                    )
                    .col(
                        ColumnDef::new(Users::HourlyRateCents)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(Users::TravelCostCents)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(Users::CreatedAt))
                    .col(timestamp_col(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_users_uuid")
                    .table(Users::Table)
                    .col(Users::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_users_role")
                    .table(Users::Table)
                    .col(Users::Role)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Sessions::Table)
                    .col(pk_id_col(manager, Sessions::Id))
                    .col(uuid_col(Sessions::Uuid))
                    .col(fk_id_col(manager, Sessions::UserId))
                    .col(ColumnDef::new(Sessions::Token).string().not_null())
                    .col(ColumnDef::new(Sessions::ExpiresAt).timestamp().not_null())
                    .col(timestamp_col(Sessions::CreatedAt))
                    .col(timestamp_col(Sessions::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_user_id")
                            .from(Sessions::Table, Sessions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_sessions_uuid")
                    .table(Sessions::Table)
                    .col(Sessions::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_sessions_token")
                    .table(Sessions::Table)
                    .col(Sessions::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_sessions_user_id")
                    .table(Sessions::Table)
                    .col(Sessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_sessions_expires_at")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Patients::Table)
                    .col(pk_id_col(manager, Patients::Id))
                    .col(uuid_col(Patients::Uuid))
                    .col(ColumnDef::new(Patients::FirstName).string().not_null())
                    .col(ColumnDef::new(Patients::LastName).string().not_null())
                    .col(ColumnDef::new(Patients::Address).string().not_null())
                    .col(ColumnDef::new(Patients::Phone).string())
                    .col(ColumnDef::new(Patients::Notes).text())
                    .col(timestamp_col(Patients::CreatedAt))
                    .col(timestamp_col(Patients::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_patients_uuid")
                    .table(Patients::Table)
                    .col(Patients::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Assignments::Table)
                    .col(pk_id_col(manager, Assignments::Id))
                    .col(uuid_col(Assignments::Uuid))
                    .col(fk_id_col(manager, Assignments::WorkerId))
                    .col(fk_id_col(manager, Assignments::PatientId))
                    .col(ColumnDef::new(Assignments::StartAt).timestamp().not_null())
                    .col(ColumnDef::new(Assignments::EndAt).timestamp().not_null())
                    .col(
                        ColumnDef::new(Assignments::Status)
                            .string_len(16)
                            .not_null()
                            .default(Expr::val("planned")),
                    )
                    .col(uuid_nullable_col(Assignments::RecurrenceGroupId))
                    .col(
                        ColumnDef::new(Assignments::Recurring)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(timestamp_col(Assignments::CreatedAt))
                    .col(timestamp_col(Assignments::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_worker_id")
                            .from(Assignments::Table, Assignments::WorkerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_patient_id")
                            .from(Assignments::Table, Assignments::PatientId)
                            .to(Patients::Table, Patients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_assignments_uuid")
                    .table(Assignments::Table)
                    .col(Assignments::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_assignments_worker_start")
                    .table(Assignments::Table)
                    .col(Assignments::WorkerId)
                    .col(Assignments::StartAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_assignments_patient_start")
                    .table(Assignments::Table)
                    .col(Assignments::PatientId)
                    .col(Assignments::StartAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_assignments_status")
                    .table(Assignments::Table)
                    .col(Assignments::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_assignments_recurrence_group_id")
                    .table(Assignments::Table)
                    .col(Assignments::RecurrenceGroupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(WorkedHours::Table)
                    .col(pk_id_col(manager, WorkedHours::Id))
                    .col(uuid_col(WorkedHours::Uuid))
                    .col(fk_id_col(manager, WorkedHours::AssignmentId))
                    .col(fk_id_col(manager, WorkedHours::WorkerId))
                    .col(ColumnDef::new(WorkedHours::StartAt).timestamp().not_null())
                    .col(ColumnDef::new(WorkedHours::EndAt).timestamp().not_null())
                    .col(timestamp_col(WorkedHours::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_worked_hours_assignment_id")
                            .from(WorkedHours::Table, WorkedHours::AssignmentId)
                            .to(Assignments::Table, Assignments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_worked_hours_worker_id")
                            .from(WorkedHours::Table, WorkedHours::WorkerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_worked_hours_uuid")
                    .table(WorkedHours::Table)
                    .col(WorkedHours::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_worked_hours_assignment_id")
                    .table(WorkedHours::Table)
                    .col(WorkedHours::AssignmentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_worked_hours_worker_start")
                    .table(WorkedHours::Table)
                    .col(WorkedHours::WorkerId)
                    .col(WorkedHours::StartAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Appointments::Table)
                    .col(pk_id_col(manager, Appointments::Id))
                    .col(uuid_col(Appointments::Uuid))
                    .col(ColumnDef::new(Appointments::Subject).string().not_null())
                    .col(ColumnDef::new(Appointments::Location).string())
                    .col(fk_id_col(manager, Appointments::WorkerId))
                    .col(ColumnDef::new(Appointments::StartAt).timestamp().not_null())
                    .col(ColumnDef::new(Appointments::EndAt).timestamp().not_null())
                    .col(
                        ColumnDef::new(Appointments::Status)
                            .string_len(16)
                            .not_null()
                            .default(Expr::val("planned")),
                    )
                    .col(timestamp_col(Appointments::CreatedAt))
                    .col(timestamp_col(Appointments::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_appointments_worker_id")
                            .from(Appointments::Table, Appointments::WorkerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_appointments_uuid")
                    .table(Appointments::Table)
                    .col(Appointments::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_appointments_worker_start")
                    .table(Appointments::Table)
                    .col(Appointments::WorkerId)
                    .col(Appointments::StartAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_appointments_status")
                    .table(Appointments::Table)
                    .col(Appointments::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Expenses::Table)
                    .col(pk_id_col(manager, Expenses::Id))
                    .col(uuid_col(Expenses::Uuid))
                    .col(ColumnDef::new(Expenses::Label).string().not_null())
                    .col(ColumnDef::new(Expenses::AmountCents).big_integer().not_null())
                    .col(ColumnDef::new(Expenses::IncurredOn).date().not_null())
                    .col(ColumnDef::new(Expenses::Category).string_len(32))
                    .col(ColumnDef::new(Expenses::ReceiptPath).string())
                    .col(fk_id_nullable_col(manager, Expenses::CreatedBy))
                    .col(timestamp_col(Expenses::CreatedAt))
                    .col(timestamp_col(Expenses::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expenses_created_by")
                            .from(Expenses::Table, Expenses::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_expenses_uuid")
                    .table(Expenses::Table)
                    .col(Expenses::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_expenses_incurred_on")
                    .table(Expenses::Table)
                    .col(Expenses::IncurredOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(EventOutbox::Table)
                    .col(pk_id_col(manager, EventOutbox::Id))
                    .col(uuid_col(EventOutbox::Uuid))
                    .col(ColumnDef::new(EventOutbox::EventType).string_len(64).not_null())
                    .col(ColumnDef::new(EventOutbox::EntityType).string_len(64).not_null())
                    .col(ColumnDef::new(EventOutbox::EntityUuid).uuid().not_null())
                    .col(ColumnDef::new(EventOutbox::Payload).json().not_null())
                    .col(timestamp_col(EventOutbox::CreatedAt))
                    .col(ColumnDef::new(EventOutbox::PublishedAt).timestamp())
                    .col(
                        ColumnDef::new(EventOutbox::Attempts)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(ColumnDef::new(EventOutbox::LastError).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_uuid")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_published_at")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::PublishedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_entity_uuid")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::EntityUuid)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventOutbox::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Appointments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkedHours::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Assignments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Patients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn fk_id_nullable_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

fn uuid_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().to_owned()
}

fn uuid_nullable_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Uuid,
    FirstName,
    LastName,
    Email,
    PasswordHash,
    PasswordSalt,
    Role,
    HourlyRateCents,
    TravelCostCents,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Sessions {
    Table,
    Id,
    Uuid,
    UserId,
    Token,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Patients {
    Table,
    Id,
    Uuid,
    FirstName,
    LastName,
    Address,
    Phone,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Assignments {
    Table,
    Id,
    Uuid,
    WorkerId,
    PatientId,
    StartAt,
    EndAt,
    Status,
    RecurrenceGroupId,
    Recurring,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum WorkedHours {
    Table,
    Id,
    Uuid,
    AssignmentId,
    WorkerId,
    StartAt,
    EndAt,
    CreatedAt,
}

#[derive(Iden)]
enum Appointments {
    Table,
    Id,
    Uuid,
    Subject,
    Location,
    WorkerId,
    StartAt,
    EndAt,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    Uuid,
    Label,
    AmountCents,
    IncurredOn,
    Category,
    ReceiptPath,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum EventOutbox {
    Table,
    Id,
    Uuid,
    EventType,
    EntityType,
    EntityUuid,
    Payload,
    CreatedAt,
    PublishedAt,
    Attempts,
    LastError,
}
