// ABOUTME: Append-only login/logout/kick audit log persistence with paged queries
// ABOUTME: Rows are never mutated; log failures are reported, not fatal to the caller
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{parse_uuid_column, Database};
use crate::errors::AppResult;
use crate::models::LoginLog;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Field set for a log insert
#[derive(Debug, Clone)]
pub struct NewLoginLog<'a> {
    /// Acting user
    pub user_uuid: Uuid,
    /// Application internal id (0 when unresolvable)
    pub app_id: i64,
    /// Action tag
    pub action: &'a str,
    /// Device the action applied to
    pub device_id: &'a str,
    /// Caller IP, empty when unknown
    pub ip_address: &'a str,
    /// Caller User-Agent, empty when unknown
    pub user_agent: &'a str,
    /// 1 = success, 0 = failure
    pub status: i64,
    /// Human-readable detail
    pub message: &'a str,
}

/// Filters for the paged log listing
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Restrict to one action tag
    pub action: Option<String>,
    /// Inclusive lower creation bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper creation bound
    pub end_time: Option<DateTime<Utc>>,
    /// 1-based page index
    pub page: i64,
    /// Rows per page
    pub page_size: i64,
}

impl Database {
    pub(super) async fn migrate_login_logs(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_login_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_uuid TEXT NOT NULL,
                app_id INTEGER NOT NULL DEFAULT 0,
                action TEXT NOT NULL,
                device_id TEXT NOT NULL DEFAULT '',
                ip_address TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 1,
                message TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sso_login_logs_user
             ON sso_login_logs(user_uuid, created_at)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Append an audit row
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_login_log(&self, log: &NewLoginLog<'_>) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO sso_login_logs
                (user_uuid, app_id, action, device_id, ip_address, user_agent,
                 status, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(log.user_uuid.to_string())
        .bind(log.app_id)
        .bind(log.action)
        .bind(log.device_id)
        .bind(log.ip_address)
        .bind(log.user_agent)
        .bind(log.status)
        .bind(log.message)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Paged log listing for one user, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if either query fails.
    pub async fn list_login_logs(
        &self,
        user_uuid: Uuid,
        filter: &LogFilter,
    ) -> AppResult<(Vec<LoginLog>, i64)> {
        let page = filter.page.max(1);
        let page_size = if filter.page_size > 0 {
            filter.page_size
        } else {
            20
        };

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM sso_login_logs
            WHERE user_uuid = ?
              AND (? IS NULL OR action = ?)
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            ",
        )
        .bind(user_uuid.to_string())
        .bind(&filter.action)
        .bind(&filter.action)
        .bind(filter.start_time)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(filter.end_time)
        .fetch_one(self.pool())
        .await?;

        let rows = sqlx::query(
            r"
            SELECT * FROM sso_login_logs
            WHERE user_uuid = ?
              AND (? IS NULL OR action = ?)
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(user_uuid.to_string())
        .bind(&filter.action)
        .bind(&filter.action)
        .bind(filter.start_time)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(filter.end_time)
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(self.pool())
        .await?;

        let logs = rows.iter().map(row_to_log).collect::<AppResult<Vec<_>>>()?;
        Ok((logs, total))
    }

    /// Count rows for one user and action (test support and admin views)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_login_logs(&self, user_uuid: Uuid, action: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sso_login_logs WHERE user_uuid = ? AND action = ?",
        )
        .bind(user_uuid.to_string())
        .bind(action)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

fn row_to_log(row: &SqliteRow) -> AppResult<LoginLog> {
    Ok(LoginLog {
        id: row.try_get("id")?,
        user_uuid: parse_uuid_column(row.try_get("user_uuid")?)?,
        app_id: row.try_get("app_id")?,
        action: row.try_get("action")?,
        device_id: row.try_get("device_id")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        status: row.try_get("status")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}
