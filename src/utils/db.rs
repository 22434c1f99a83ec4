use std::path::Path;

use anyhow::{anyhow, Error};
use sqlx::migrate::Migrator;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::OnceCell;

use crate::utils::config::get_config;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if absent) the SQLite file at `file_path`, enables WAL
    /// journaling and foreign key enforcement on every pooled connection, and
    /// runs pending migrations.
    pub async fn init_application_db(file_path: &str) -> Result<Self, Error> {
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::Executor::execute(conn, "PRAGMA journal_mode = WAL;").await?;
                    sqlx::Executor::execute(conn, "PRAGMA foreign_keys = ON;").await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite:{file_path}?mode=rwc"))
            .await?;

        let db = Database { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), Error> {
        let migrations = Migrator::new(Path::new("./migrations")).await?;
        migrations.run(&self.pool).await?;

        Ok(())
    }
}

pub async fn get_application_db() -> Result<&'static Database, Error> {
    static DB_INSTANCE: OnceCell<Result<Database, String>> = OnceCell::const_new();

    let result = DB_INSTANCE
        .get_or_init(|| async {
            let config = match get_config() {
                Ok(config) => config,
                Err(err) => return Err(err.to_string()),
            };

            let db_path = match config.database.path.to_str() {
                Some(path) => path,
                None => return Err("Failed to parse config's DB path into a string!".to_string()),
            };

            match Database::init_application_db(db_path).await {
                Ok(db) => Ok(db),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

    match result {
        Ok(db) => Ok(db),
        Err(msg) => Err(anyhow!("{}", msg)),
    }
}
