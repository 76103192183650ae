use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use utils::assets::db_path;

pub use sea_orm::{DbErr, TransactionTrait};

pub mod entities;
pub mod events;
pub mod models;
pub mod types;

pub type DbPool = DatabaseConnection;

#[derive(Clone)]
pub struct DBService {
    pub pool: DatabaseConnection,
}

impl DBService {
    pub async fn new() -> Result<DBService, DbErr> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => format!("sqlite://{}?mode=rwc", db_path().to_string_lossy()),
        };

        let mut options = ConnectOptions::new(database_url);
        options
            .max_connections(5)
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        Ok(DBService { pool })
    }
}
