// ABOUTME: Application registry persistence and lookups by app_key or internal id
// ABOUTME: app_key is the external identity; the integer id never leaves foreign keys
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::Database;
use crate::errors::AppResult;
use crate::models::Application;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Database {
    pub(super) async fn migrate_applications(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_key TEXT NOT NULL UNIQUE,
                app_name TEXT NOT NULL,
                app_secret TEXT NOT NULL,
                redirect_uris TEXT NOT NULL DEFAULT '',
                max_devices INTEGER NOT NULL DEFAULT 5,
                allowed_origins TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch an enabled application by its external key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_application_by_key(&self, app_key: &str) -> AppResult<Option<Application>> {
        let row = sqlx::query("SELECT * FROM sso_applications WHERE app_key = ? AND status = 1")
            .bind(app_key)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_application).transpose()
    }

    /// Fetch an application by internal id regardless of status (log display)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_application_by_id(&self, id: i64) -> AppResult<Option<Application>> {
        let row = sqlx::query("SELECT * FROM sso_applications WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_application).transpose()
    }

    /// All enabled applications, for the public directory
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_enabled_applications(&self) -> AppResult<Vec<Application>> {
        let rows = sqlx::query("SELECT * FROM sso_applications WHERE status = 1 ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_application).collect()
    }

    /// Every application, enabled or not (manage device listing joins on it)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_applications(&self) -> AppResult<Vec<Application>> {
        let rows = sqlx::query("SELECT * FROM sso_applications ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_application).collect()
    }

    /// Insert an application (seeding and tests)
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_application(&self, app: &Application) -> AppResult<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO sso_applications
                (app_key, app_name, app_secret, redirect_uris, max_devices,
                 allowed_origins, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&app.app_key)
        .bind(&app.app_name)
        .bind(&app.app_secret)
        .bind(&app.redirect_uris)
        .bind(app.max_devices)
        .bind(&app.allowed_origins)
        .bind(app.status)
        .bind(app.created_at)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }
}

fn row_to_application(row: &SqliteRow) -> AppResult<Application> {
    Ok(Application {
        id: row.try_get("id")?,
        app_key: row.try_get("app_key")?,
        app_name: row.try_get("app_name")?,
        app_secret: row.try_get("app_secret")?,
        redirect_uris: row.try_get("redirect_uris")?,
        max_devices: row.try_get("max_devices")?,
        allowed_origins: row.try_get("allowed_origins")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}
