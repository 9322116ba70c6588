// ABOUTME: User-application grant persistence, unique on (user_uuid, app_id)
// ABOUTME: Grants are created lazily; denied status is the only per-user app block
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{parse_uuid_column, Database};
use crate::errors::AppResult;
use crate::models::UserAppGrant;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_grants(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_user_app_grants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_uuid TEXT NOT NULL,
                app_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                UNIQUE (user_uuid, app_id)
            )
            ",
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch the grant for a (user, app) pair
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_grant(&self, user_uuid: Uuid, app_id: i64) -> AppResult<Option<UserAppGrant>> {
        let row = sqlx::query("SELECT * FROM sso_user_app_grants WHERE user_uuid = ? AND app_id = ?")
            .bind(user_uuid.to_string())
            .bind(app_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_grant).transpose()
    }

    /// Create an allowed grant outside a transaction (login auto-create path).
    /// A concurrent duplicate insert loses against the uniqueness constraint
    /// and is treated as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any reason other than the
    /// uniqueness constraint.
    pub async fn create_grant(&self, user_uuid: Uuid, app_id: i64) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO sso_user_app_grants (user_uuid, app_id, status, created_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT (user_uuid, app_id) DO NOTHING
            ",
        )
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Flip a grant between allowed and denied (admin tooling)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_grant_status(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        status: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE sso_user_app_grants SET status = ? WHERE user_uuid = ? AND app_id = ?")
            .bind(status)
            .bind(user_uuid.to_string())
            .bind(app_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

pub(super) async fn insert_grant(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_uuid: Uuid,
    app_id: i64,
) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO sso_user_app_grants (user_uuid, app_id, status, created_at)
        VALUES (?, ?, 1, ?)
        ",
    )
    .bind(user_uuid.to_string())
    .bind(app_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_grant(row: &SqliteRow) -> AppResult<UserAppGrant> {
    Ok(UserAppGrant {
        id: row.try_get("id")?,
        user_uuid: parse_uuid_column(row.try_get("user_uuid")?)?,
        app_id: row.try_get("app_id")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}
