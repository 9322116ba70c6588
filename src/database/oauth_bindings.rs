// ABOUTME: External-identity binding persistence, unique on (provider, open_id)
// ABOUTME: Created once per external identity inside the federated-login transaction
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{parse_uuid_column, Database};
use crate::errors::AppResult;
use crate::models::OAuthBinding;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_oauth_bindings(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_oauth_bindings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_uuid TEXT NOT NULL,
                provider TEXT NOT NULL,
                open_id TEXT NOT NULL,
                union_id TEXT,
                created_at DATETIME NOT NULL,
                UNIQUE (provider, open_id)
            )
            ",
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch the binding for an external identity
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_oauth_binding(
        &self,
        provider: &str,
        open_id: &str,
    ) -> AppResult<Option<OAuthBinding>> {
        let row = sqlx::query("SELECT * FROM sso_oauth_bindings WHERE provider = ? AND open_id = ?")
            .bind(provider)
            .bind(open_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_binding).transpose()
    }
}

pub(super) async fn insert_binding(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_uuid: Uuid,
    provider: &str,
    open_id: &str,
    union_id: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO sso_oauth_bindings (user_uuid, provider, open_id, union_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(user_uuid.to_string())
    .bind(provider)
    .bind(open_id)
    .bind(union_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_binding(row: &SqliteRow) -> AppResult<OAuthBinding> {
    Ok(OAuthBinding {
        id: row.try_get("id")?,
        user_uuid: parse_uuid_column(row.try_get("user_uuid")?)?,
        provider: row.try_get("provider")?,
        open_id: row.try_get("open_id")?,
        union_id: row.try_get("union_id")?,
        created_at: row.try_get("created_at")?,
    })
}
