// ABOUTME: Manage surface services: device listing, manual kick, SSO logout, logout-all, logs
// ABOUTME: Global logout kicks every online device across apps and clears the session
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::cache::{keys, Kv};
use crate::database::{Database, LogFilter, NewLoginLog};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{device_status, DeviceInfo, LogInfo, LoginAction, PageResponse};
use crate::services::devices::DeviceManager;
use std::collections::HashMap;
use uuid::Uuid;

/// Device and audit management for authenticated users
#[derive(Clone)]
pub struct ManageService {
    database: Database,
    kv: Kv,
    devices: DeviceManager,
}

impl ManageService {
    /// Assemble the service from shared resources
    #[must_use]
    pub fn new(database: Database, kv: Kv) -> Self {
        let devices = DeviceManager::new(database.clone(), kv.clone());
        Self {
            database,
            kv,
            devices,
        }
    }

    /// All online devices of the user across apps, newest activity first,
    /// with the caller's own device marked
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn get_user_devices(
        &self,
        user_uuid: Uuid,
        current_device_id: &str,
    ) -> AppResult<Vec<DeviceInfo>> {
        let devices = self.database.list_online_devices(user_uuid).await?;

        let apps: HashMap<i64, _> = self
            .database
            .list_applications()
            .await?
            .into_iter()
            .map(|app| (app.id, app))
            .collect();

        Ok(devices
            .into_iter()
            .map(|device| {
                let app = apps.get(&device.app_id);
                DeviceInfo {
                    id: device.id,
                    is_current: device.device_id == current_device_id,
                    device_id: device.device_id,
                    device_name: device.device_name,
                    device_type: device.device_type,
                    ip_address: device.ip_address,
                    last_active_at: device.last_active_at,
                    status: device.status,
                    created_at: device.created_at,
                    app_name: app.map(|a| a.app_name.clone()).unwrap_or_default(),
                    app_key: app.map(|a| a.app_key.clone()).unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Kick one of the user's devices. Refusing the caller's own device is
    /// the route layer's job (it knows the request's claims).
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when the device is missing or offline.
    pub async fn kick_device(
        &self,
        user_uuid: Uuid,
        device_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> AppResult<()> {
        let device = self
            .database
            .find_online_device_any_app(user_uuid, device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceNotFound))?;

        self.devices
            .kick(
                user_uuid,
                device.app_id,
                device_id,
                LoginAction::ManualKick,
                "管理员手动踢出",
                ip_address,
                user_agent,
            )
            .await?;

        tracing::info!(user_uuid = %user_uuid, device_id, "device kicked manually");
        Ok(())
    }

    /// SSO logout for the current device: drop its refresh handle, flip it
    /// offline and record `sso_logout`. The caller clears the session cookie.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when the device is missing or offline.
    pub async fn sso_logout(
        &self,
        user_uuid: Uuid,
        device_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> AppResult<()> {
        let device = self
            .database
            .find_online_device_any_app(user_uuid, device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceNotFound))?;

        self.kv
            .delete(&keys::refresh_token(user_uuid, device_id))
            .await?;

        self.database
            .set_device_status(user_uuid, device.app_id, device_id, device_status::OFFLINE)
            .await?;

        self.log(&NewLoginLog {
            user_uuid,
            app_id: device.app_id,
            action: LoginAction::SsoLogout.as_str(),
            device_id,
            ip_address,
            user_agent,
            status: 1,
            message: "SSO退出成功",
        })
        .await;

        Ok(())
    }

    /// Per-app logout for the manage surface: only the refresh handle is
    /// dropped; the device row and SSO session survive.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when the device is missing or offline.
    pub async fn app_logout(
        &self,
        user_uuid: Uuid,
        device_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> AppResult<()> {
        let device = self
            .database
            .find_online_device_any_app(user_uuid, device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceNotFound))?;

        self.kv
            .delete(&keys::refresh_token(user_uuid, device_id))
            .await?;

        self.log(&NewLoginLog {
            user_uuid,
            app_id: device.app_id,
            action: LoginAction::Logout.as_str(),
            device_id,
            ip_address,
            user_agent,
            status: 1,
            message: "应用退出成功",
        })
        .await;

        Ok(())
    }

    /// Global logout: kick every online device of the user across all apps.
    /// Per-device failures are reported and skipped; the sweep continues.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when there is no online device at all.
    pub async fn logout_all_devices(
        &self,
        user_uuid: Uuid,
        ip_address: &str,
        user_agent: &str,
    ) -> AppResult<usize> {
        let devices = self.database.list_online_devices(user_uuid).await?;
        if devices.is_empty() {
            return Err(AppError::new(ErrorCode::DeviceNotFound, "没有活跃设备"));
        }

        let mut kicked = 0usize;
        for device in &devices {
            match self
                .devices
                .kick(
                    user_uuid,
                    device.app_id,
                    &device.device_id,
                    LoginAction::SsoLogout,
                    "退出所有设备",
                    ip_address,
                    user_agent,
                )
                .await
            {
                Ok(()) => kicked += 1,
                Err(e) => {
                    tracing::error!(device_id = %device.device_id, "failed to kick device: {e}");
                }
            }
        }

        tracing::info!(
            user_uuid = %user_uuid,
            total = devices.len(),
            kicked,
            "logout-all sweep finished"
        );
        Ok(kicked)
    }

    /// Paged audit log for the user
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn get_operation_logs(
        &self,
        user_uuid: Uuid,
        filter: &LogFilter,
    ) -> AppResult<PageResponse<LogInfo>> {
        let (logs, total) = self.database.list_login_logs(user_uuid, filter).await?;

        Ok(PageResponse {
            list: logs
                .into_iter()
                .map(|log| LogInfo {
                    id: log.id,
                    action: log.action,
                    device_id: log.device_id,
                    ip_address: log.ip_address,
                    status: log.status,
                    message: log.message,
                    created_at: log.created_at,
                })
                .collect(),
            total,
            page: filter.page.max(1),
            page_size: if filter.page_size > 0 {
                filter.page_size
            } else {
                20
            },
        })
    }

    async fn log(&self, log: &NewLoginLog<'_>) {
        if let Err(e) = self.database.insert_login_log(log).await {
            tracing::error!(action = log.action, "failed to write login log: {e}");
        }
    }
}
