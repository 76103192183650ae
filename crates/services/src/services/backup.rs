use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DbErr};
use serde::Serialize;
use ts_rs::TS;

use db::models::{
    appointment::Appointment,
    assignment::{Assignment, AssignmentFilter},
    expense::Expense,
    patient::Patient,
    user::User,
    worked_hours::WorkedHours,
};

/// Full JSON export of the core tables. Credential and session data stay
/// out of the dump.
#[derive(Debug, Serialize, TS)]
pub struct BackupDump {
    #[ts(type = "Date")]
    pub generated_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub patients: Vec<Patient>,
    pub assignments: Vec<Assignment>,
    pub worked_hours: Vec<WorkedHours>,
    pub appointments: Vec<Appointment>,
    pub expenses: Vec<Expense>,
}

pub async fn export<C: ConnectionTrait>(db: &C) -> Result<BackupDump, DbErr> {
    Ok(BackupDump {
        generated_at: Utc::now(),
        users: User::find_all(db).await?,
        patients: Patient::find_all(db).await?,
        assignments: Assignment::find_filtered(db, &AssignmentFilter::default()).await?,
        worked_hours: WorkedHours::find_all(db).await?,
        appointments: Appointment::find_filtered(db, None).await?,
        expenses: Expense::find_filtered(db, None, None).await?,
    })
}
