use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};

use crate::domain::{Setting, SettingValue};
use super::RepositoryError;

#[derive(FromRow)]
struct DbSetting {
    key: String,
    value: Option<String>,
    value_type: String,
    description: Option<String>,
    updated_at: NaiveDateTime,
}

fn to_domain(row: DbSetting) -> Setting {
    let value = row.value.map(|v| SettingValue::parse(&row.value_type, &v)).unwrap_or(SettingValue::Str(String::new()));
    let mut setting = Setting::new(row.key, value, row.updated_at.and_utc()).expect("non-empty key from DB");
    setting.set_description(row.description);
    setting
}

pub struct SqliteSettingsRepository;

impl SqliteSettingsRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteSettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteSettingsRepository {
    pub async fn all<'e, E>(&self, executor: E) -> Result<Vec<Setting>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, DbSetting>("SELECT key, value, value_type, description, updated_at FROM settings;")
            .fetch_all(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(rows.into_iter().map(to_domain).collect())
    }

    pub async fn by_key<'e, E>(&self, executor: E, key: &str) -> Result<Option<Setting>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DbSetting>("SELECT key, value, value_type, description, updated_at FROM settings WHERE key = ?;")
            .bind(key)
            .fetch_optional(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.map(to_domain))
    }

    /// Insert or overwrite a single row; used to layer user overrides on top of defaults.
    pub async fn upsert<'e, E>(&self, executor: E, key: &str, value: &SettingValue, description: Option<&str>) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO settings(key, value, value_type, description, updated_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, value_type = excluded.value_type, updated_at = excluded.updated_at;",
        )
        .bind(key)
        .bind(value.to_raw())
        .bind(value.type_tag())
        .bind(description)
        .bind(Utc::now().naive_utc())
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }
}
