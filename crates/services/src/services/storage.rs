use std::path::Path;

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait};
use serde::Serialize;
use ts_rs::TS;

use db::entities::{appointment, assignment, expense, patient, user, worked_hours};
use utils::assets::{db_path, receipts_dir};

#[derive(Debug, Serialize, TS)]
pub struct RowCounts {
    pub users: u64,
    pub patients: u64,
    pub assignments: u64,
    pub worked_hours: u64,
    pub appointments: u64,
    pub expenses: u64,
}

#[derive(Debug, Serialize, TS)]
pub struct StorageStats {
    pub database_bytes: u64,
    pub receipts_bytes: u64,
    pub row_counts: RowCounts,
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };

    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                file_size(&path)
            }
        })
        .sum()
}

pub async fn stats<C: ConnectionTrait>(db: &C) -> Result<StorageStats, DbErr> {
    let database = db_path();
    // WAL journals count toward the database footprint.
    let database_bytes = file_size(&database)
        + file_size(&database.with_extension("sqlite-wal"))
        + file_size(&database.with_extension("sqlite-shm"));

    let row_counts = RowCounts {
        users: user::Entity::find().count(db).await?,
        patients: patient::Entity::find().count(db).await?,
        assignments: assignment::Entity::find().count(db).await?,
        worked_hours: worked_hours::Entity::find().count(db).await?,
        appointments: appointment::Entity::find().count(db).await?,
        expenses: expense::Entity::find().count(db).await?,
    };

    Ok(StorageStats {
        database_bytes,
        receipts_bytes: dir_size(&receipts_dir()),
        row_counts,
    })
}
