// ABOUTME: Device persistence with transactional quota enforcement and LRU eviction
// ABOUTME: Unique on (user_uuid, app_id, device_id); eviction victim chosen inside the transaction
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{parse_uuid_column, Database};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{Device, LoginAction};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Outcome of a register-or-touch call
#[derive(Debug)]
pub struct DeviceRegistration {
    /// Whether a new row was inserted (false: existing row touched)
    pub created: bool,
    /// Devices forced offline to make room; callers revoke their tokens
    pub evicted: Vec<Device>,
}

impl Database {
    pub(super) async fn migrate_devices(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sso_devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_uuid TEXT NOT NULL,
                app_id INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                device_name TEXT NOT NULL DEFAULT '',
                device_type TEXT NOT NULL DEFAULT '',
                ip_address TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                last_active_at DATETIME NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                UNIQUE (user_uuid, app_id, device_id)
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sso_devices_user_app
             ON sso_devices(user_uuid, app_id, status)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Register a new device or touch an existing one, enforcing the quota.
    ///
    /// Count, eviction-victim selection, the victim's offline update, its
    /// `auto_kick` log row and the new insert all run in one transaction, so
    /// two concurrent logins for the same (user, app) cannot both observe the
    /// pre-eviction count: one serializes behind the other, and a duplicate
    /// insert of the same device id is stopped by the uniqueness constraint.
    ///
    /// # Errors
    ///
    /// `DeviceQuotaExceeded` when the quota leaves no room and there is no
    /// victim to evict (notably `max_devices = 0`, which disables the app).
    #[allow(clippy::too_many_arguments)]
    pub async fn register_or_touch_device(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
        device_name: &str,
        device_type: &str,
        ip_address: &str,
        user_agent: &str,
        max_devices: i64,
    ) -> AppResult<DeviceRegistration> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query(
            "SELECT * FROM sso_devices WHERE user_uuid = ? AND app_id = ? AND device_id = ?",
        )
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let device = row_to_device(&row)?;
            sqlx::query(
                r"
                UPDATE sso_devices SET
                    device_name = CASE WHEN ? != '' THEN ? ELSE device_name END,
                    device_type = CASE WHEN ? != '' THEN ? ELSE device_type END,
                    ip_address = ?, user_agent = ?, last_active_at = ?, status = 1
                WHERE id = ?
                ",
            )
            .bind(device_name)
            .bind(device_name)
            .bind(device_type)
            .bind(device_type)
            .bind(ip_address)
            .bind(user_agent)
            .bind(now)
            .bind(device.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            return Ok(DeviceRegistration {
                created: false,
                evicted: Vec::new(),
            });
        }

        let mut evicted = Vec::new();
        loop {
            let online: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sso_devices
                 WHERE user_uuid = ? AND app_id = ? AND status = 1",
            )
            .bind(user_uuid.to_string())
            .bind(app_id)
            .fetch_one(&mut *tx)
            .await?;

            if online < max_devices {
                break;
            }

            // Strictly min(last_active_at), ties broken by smallest id
            let victim = sqlx::query(
                "SELECT * FROM sso_devices
                 WHERE user_uuid = ? AND app_id = ? AND status = 1
                 ORDER BY last_active_at ASC, id ASC LIMIT 1",
            )
            .bind(user_uuid.to_string())
            .bind(app_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(victim_row) = victim else {
                // max_devices = 0: no victim can make room, the app is closed
                return Err(AppError::from_code(ErrorCode::DeviceQuotaExceeded));
            };
            let victim = row_to_device(&victim_row)?;

            sqlx::query("UPDATE sso_devices SET status = 0 WHERE id = ?")
                .bind(victim.id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r"
                INSERT INTO sso_login_logs
                    (user_uuid, app_id, action, device_id, ip_address, user_agent,
                     status, message, created_at)
                VALUES (?, ?, ?, ?, '', '', 1, ?, ?)
                ",
            )
            .bind(user_uuid.to_string())
            .bind(app_id)
            .bind(LoginAction::AutoKick.as_str())
            .bind(&victim.device_id)
            .bind("设备数量超限，自动踢出")
            .bind(now)
            .execute(&mut *tx)
            .await?;

            evicted.push(victim);
        }

        sqlx::query(
            r"
            INSERT INTO sso_devices
                (user_uuid, app_id, device_id, device_name, device_type,
                 ip_address, user_agent, last_active_at, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            ",
        )
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(device_id)
        .bind(device_name)
        .bind(device_type)
        .bind(ip_address)
        .bind(user_agent)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DeviceRegistration {
            created: true,
            evicted,
        })
    }

    /// Fetch a device row regardless of status
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_device(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
    ) -> AppResult<Option<Device>> {
        let row = sqlx::query(
            "SELECT * FROM sso_devices WHERE user_uuid = ? AND app_id = ? AND device_id = ?",
        )
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_device).transpose()
    }

    /// Fetch an online device row
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_online_device(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
    ) -> AppResult<Option<Device>> {
        Ok(self
            .get_device(user_uuid, app_id, device_id)
            .await?
            .filter(Device::is_online))
    }

    /// Set a device's status, scoped by app so rows of other apps sharing the
    /// same device id are untouched
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_device_status(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
        status: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE sso_devices SET status = ?
             WHERE user_uuid = ? AND app_id = ? AND device_id = ?",
        )
        .bind(status)
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(device_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Refresh the sliding-expiry anchor
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn touch_device(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE sso_devices SET last_active_at = ?
             WHERE user_uuid = ? AND app_id = ? AND device_id = ?",
        )
        .bind(at)
        .bind(user_uuid.to_string())
        .bind(app_id)
        .bind(device_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All online devices of a user across every app, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_online_devices(&self, user_uuid: Uuid) -> AppResult<Vec<Device>> {
        let rows = sqlx::query(
            "SELECT * FROM sso_devices WHERE user_uuid = ? AND status = 1
             ORDER BY last_active_at DESC",
        )
        .bind(user_uuid.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_device).collect()
    }

    /// Online device count for a (user, app) pair
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_online_devices(&self, user_uuid: Uuid, app_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sso_devices
             WHERE user_uuid = ? AND app_id = ? AND status = 1",
        )
        .bind(user_uuid.to_string())
        .bind(app_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Find an online device of a user by device id alone (manage surface,
    /// where the caller does not know the owning app)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_online_device_any_app(
        &self,
        user_uuid: Uuid,
        device_id: &str,
    ) -> AppResult<Option<Device>> {
        let row = sqlx::query(
            "SELECT * FROM sso_devices WHERE user_uuid = ? AND device_id = ? AND status = 1",
        )
        .bind(user_uuid.to_string())
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_device).transpose()
    }
}

fn row_to_device(row: &SqliteRow) -> AppResult<Device> {
    Ok(Device {
        id: row.try_get("id")?,
        user_uuid: parse_uuid_column(row.try_get("user_uuid")?)?,
        app_id: row.try_get("app_id")?,
        device_id: row.try_get("device_id")?,
        device_name: row.try_get("device_name")?,
        device_type: row.try_get("device_type")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        last_active_at: row.try_get("last_active_at")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}
