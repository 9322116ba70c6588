// ABOUTME: Link-or-create federated login on top of the auth core and a provider adapter
// ABOUTME: First login creates user + binding + grant atomically; returning users just link
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Federated Login
//!
//! Resolves an external code through the provider adapter, links the external
//! identity to a local account (creating user, OAuth binding and app grant in
//! one transaction for first-time users) and then runs the same device
//! registration and token issuance as the password login path.

use crate::crypto::{generate_throwaway_password, hash_password};
use crate::database::{Database, NewLoginLog, NewUser};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::federation::{ExternalProfile, ProviderRegistry};
use crate::models::{LoginAction, RegisterSource, TokenResponse, User, UserInfo, UserStatus};
use crate::services::auth::AuthService;
use crate::services::devices::DeviceDescriptor;
use uuid::Uuid;

/// Federated login input
#[derive(Debug, Clone)]
pub struct FederatedLoginParams {
    /// Provider tag ("qq")
    pub provider: String,
    /// Authorization code from the provider callback
    pub code: String,
    /// Requesting application
    pub app_key: String,
    /// Device the login happens from
    pub device: DeviceDescriptor,
}

/// Federated login service
#[derive(Clone)]
pub struct FederatedLoginService {
    database: Database,
    auth: AuthService,
    registry: ProviderRegistry,
    default_avatar: String,
}

impl FederatedLoginService {
    /// Assemble the service from shared resources
    #[must_use]
    pub fn new(
        database: Database,
        auth: AuthService,
        registry: ProviderRegistry,
        default_avatar: String,
    ) -> Self {
        Self {
            database,
            auth,
            registry,
            default_avatar,
        }
    }

    /// Run the full federated login: code exchange, link-or-create, device
    /// registration, token issuance, audit row.
    ///
    /// # Errors
    ///
    /// `ExternalServiceError` when the provider misbehaves; otherwise the
    /// same error kinds as the password login path.
    pub async fn login(&self, params: &FederatedLoginParams) -> AppResult<TokenResponse> {
        let provider = self
            .registry
            .get(&params.provider)
            .ok_or_else(|| AppError::from_code(ErrorCode::QqLoginDisabled))?;

        let identity = provider.exchange_code(&params.code).await?;
        let profile = provider
            .fetch_profile(&identity)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("profile fetch failed, using defaults: {e}");
                ExternalProfile::default()
            });

        let app = self.auth.get_app_by_key(&params.app_key).await?;

        let (user, is_new_user) = match self
            .database
            .get_oauth_binding(provider.tag(), &identity.open_id)
            .await?
        {
            Some(binding) => {
                let user = self
                    .database
                    .get_user_by_uuid(binding.user_uuid)
                    .await?
                    .ok_or_else(|| AppError::from_code(ErrorCode::UserNotFound))?;
                (user, false)
            }
            None => {
                let user = self
                    .create_federated_user(provider.tag(), &identity.open_id, identity.union_id.as_deref(), &profile, app.id)
                    .await?;
                (user, true)
            }
        };

        if user.status != UserStatus::Active {
            return Err(AppError::new(
                ErrorCode::AccountDisabled,
                "账号已被禁用或注销",
            ));
        }

        self.auth.ensure_grant(user.uuid, app.id).await?;

        let mut device = params.device.clone();
        if device.device_id.is_empty() {
            device.device_id = Uuid::new_v4().to_string();
        }

        let registration = self
            .auth
            .devices()
            .register_or_touch(user.uuid, app.id, &device, app.max_devices)
            .await?;

        // Same as the password path: proven credentials lift a device kick
        self.auth.devices().clear_blacklist(&device.device_id).await?;

        let (access_token, refresh_token) = self
            .auth
            .issue_token_pair(user.uuid, &app.app_key, &device.device_id)
            .await?;

        self.auth
            .log_action(&NewLoginLog {
                user_uuid: user.uuid,
                app_id: app.id,
                action: LoginAction::QqLogin.as_str(),
                device_id: &device.device_id,
                ip_address: &device.ip_address,
                user_agent: &device.user_agent,
                status: 1,
                message: match (is_new_user, registration.created) {
                    (true, _) => "QQ登录（新用户）",
                    (false, true) => "QQ新设备登录成功",
                    (false, false) => "QQ登录成功",
                },
            })
            .await;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.auth.access_ttl_secs(),
            user_info: Some(UserInfo::from(&user)),
        })
    }

    /// First federated login: user + binding + grant, all three or none.
    /// The account gets a hashed random throwaway password so password login
    /// stays closed.
    async fn create_federated_user(
        &self,
        provider_tag: &str,
        open_id: &str,
        union_id: Option<&str>,
        profile: &ExternalProfile,
        app_id: i64,
    ) -> AppResult<User> {
        let nickname = if profile.nickname.is_empty() {
            "QQ用户"
        } else {
            profile.nickname.as_str()
        };
        let avatar = if profile.avatar.is_empty() {
            self.default_avatar.as_str()
        } else {
            profile.avatar.as_str()
        };

        let throwaway = hash_password(&generate_throwaway_password())?;

        self.database
            .create_federated_user(
                &NewUser {
                    uuid: Uuid::new_v4(),
                    username: nickname,
                    password_hash: Some(&throwaway),
                    email: None,
                    nickname,
                    avatar,
                    register_source: RegisterSource::Qq,
                },
                provider_tag,
                open_id,
                union_id,
                app_id,
            )
            .await
    }
}
