// ABOUTME: Device manager enforcing the per-(user, app) quota with LRU eviction
// ABOUTME: Kicks blacklist first, then flip status, so token checks never see a stale online row
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Device Manager
//!
//! Owns the device population of every (user, app) pair. Registration runs
//! count → evict → insert inside one database transaction (see
//! `Database::register_or_touch_device`); this service layers the KV
//! side-effects on top: blacklisting kicked devices and dropping their
//! refresh-token handles.

use crate::cache::{keys, Kv};
use crate::database::{Database, DeviceRegistration, NewLoginLog};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{device_status, Device, LoginAction};
use chrono::Utc;
use uuid::Uuid;

/// Sliding-expiry window in seconds: a device is valid while
/// `now - last_active_at ≤ 7d`
pub const SLIDING_EXPIRY_SECS: i64 = 7 * 24 * 3600;

/// Descriptor of the device a request comes from
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor {
    /// Client-minted stable identifier
    pub device_id: String,
    /// Display name; empty keeps an existing row's name
    pub device_name: String,
    /// web / ios / android / ...
    pub device_type: String,
    /// Caller IP
    pub ip_address: String,
    /// Caller User-Agent
    pub user_agent: String,
}

/// Device lifecycle operations over the shared stores
#[derive(Clone)]
pub struct DeviceManager {
    database: Database,
    kv: Kv,
}

impl DeviceManager {
    /// Create a manager over the shared stores
    #[must_use]
    pub const fn new(database: Database, kv: Kv) -> Self {
        Self { database, kv }
    }

    /// Register a new device or touch an existing one, enforcing the quota.
    /// Evicted devices are blacklisted and lose their refresh-token handle.
    ///
    /// # Errors
    ///
    /// `DeviceQuotaExceeded` when no eviction can make room.
    pub async fn register_or_touch(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        descriptor: &DeviceDescriptor,
        max_devices: i64,
    ) -> AppResult<DeviceRegistration> {
        let registration = self
            .database
            .register_or_touch_device(
                user_uuid,
                app_id,
                &descriptor.device_id,
                &descriptor.device_name,
                &descriptor.device_type,
                &descriptor.ip_address,
                &descriptor.user_agent,
                max_devices,
            )
            .await?;

        for evicted in &registration.evicted {
            self.revoke_device_tokens(evicted).await;
            tracing::info!(
                user_uuid = %user_uuid,
                device_id = %evicted.device_id,
                "evicted least-recently-active device over quota"
            );
        }

        Ok(registration)
    }

    /// Kick a device: blacklist entry first (7-day TTL), then the status
    /// flip, then the audit row. The ordering guarantees a concurrent
    /// access-token check sees the blacklist before any inconsistent state.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when the device is missing or already offline.
    pub async fn kick(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
        action: LoginAction,
        message: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> AppResult<()> {
        let device = self
            .database
            .get_online_device(user_uuid, app_id, device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceNotFound))?;

        self.revoke_device_tokens(&device).await;

        self.database
            .set_device_status(user_uuid, app_id, device_id, device_status::OFFLINE)
            .await?;

        self.log(&NewLoginLog {
            user_uuid,
            app_id,
            action: action.as_str(),
            device_id,
            ip_address,
            user_agent,
            status: 1,
            message,
        })
        .await;

        Ok(())
    }

    /// Sliding-expiry check invoked on every silent authorize.
    ///
    /// Success refreshes `last_active_at`. A device past the window is kicked
    /// with an `expired` audit row and the call fails `DeviceExpired`.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when missing or offline, `DeviceExpired` past the
    /// window.
    pub async fn check_sliding_expiry(
        &self,
        user_uuid: Uuid,
        app_id: i64,
        device_id: &str,
    ) -> AppResult<()> {
        let device = self
            .database
            .get_online_device(user_uuid, app_id, device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceNotFound))?;

        if (Utc::now() - device.last_active_at).num_seconds() > SLIDING_EXPIRY_SECS {
            if let Err(e) = self
                .kick(
                    user_uuid,
                    app_id,
                    device_id,
                    LoginAction::Expired,
                    "设备长时间未活跃，自动下线",
                    "",
                    "",
                )
                .await
            {
                tracing::error!(device_id, "failed to kick expired device: {e}");
            }
            return Err(AppError::from_code(ErrorCode::DeviceExpired));
        }

        if let Err(e) = self
            .database
            .touch_device(user_uuid, app_id, device_id, Utc::now())
            .await
        {
            // Stale activity only shortens the window; the login proceeds
            tracing::error!(device_id, "failed to touch device activity: {e}");
        }

        Ok(())
    }

    /// Whether a device id sits in the blacklist
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store is unreachable.
    pub async fn is_blacklisted(&self, device_id: &str) -> AppResult<bool> {
        self.kv.exists(&keys::device_blacklist(device_id)).await
    }

    /// Drop a device's blacklist entry. A fresh credentialed login
    /// re-establishes trust; token-only paths stay blocked until then.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store is unreachable.
    pub async fn clear_blacklist(&self, device_id: &str) -> AppResult<()> {
        self.kv.delete(&keys::device_blacklist(device_id)).await
    }

    /// Blacklist the device and drop its refresh-token handle
    async fn revoke_device_tokens(&self, device: &Device) {
        if let Err(e) = self
            .kv
            .set(
                &keys::device_blacklist(&device.device_id),
                "1",
                Some(keys::DEVICE_BLACKLIST_TTL),
            )
            .await
        {
            tracing::error!(device_id = %device.device_id, "failed to blacklist device: {e}");
        }
        if let Err(e) = self
            .kv
            .delete(&keys::refresh_token(device.user_uuid, &device.device_id))
            .await
        {
            tracing::error!(device_id = %device.device_id, "failed to drop refresh token: {e}");
        }
    }

    /// Append an audit row, reporting instead of failing on error
    async fn log(&self, log: &NewLoginLog<'_>) {
        if let Err(e) = self.database.insert_login_log(log).await {
            tracing::error!(action = log.action, "failed to write login log: {e}");
        }
    }
}
