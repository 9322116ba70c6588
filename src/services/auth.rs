// ABOUTME: Auth core: registration, password/email-code login, refresh rotation, logout
// ABOUTME: Every token issuance writes the refresh-token revocation handle into the KV store
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Auth Core
//!
//! The login path resolves the user, verifies the secret, checks account and
//! grant state, registers the device (possibly evicting over quota), mints
//! the token pair and records the audit row. Unknown-email and wrong-password
//! answer with the same message on purpose.
//!
//! Refresh is rotation: a new pair is minted and the stored handle under
//! `refresh_token:{uuid}:{device}` is overwritten. The presented token must
//! equal the stored one, so a rotated-away token fails as revoked. Two
//! concurrent refreshes race last-writer-wins on the KV; both callers get
//! valid tokens but only one survives the next rotation, which is accepted.

use crate::auth::{TokenCodec, TokenKind, TokenValidationError};
use crate::cache::{keys, Kv};
use crate::crypto::{generate_verification_code, hash_password, verify_password};
use crate::database::{Database, NewLoginLog, NewUser};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::mail::Mailer;
use crate::models::{
    device_status, Application, LoginAction, RegisterSource, TokenResponse, User, UserInfo,
    UserStatus,
};
use crate::services::devices::{DeviceDescriptor, DeviceManager};
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterParams {
    /// Login email, unique
    pub email: String,
    /// Plaintext password, hashed before storage
    pub password: String,
    /// Public nickname
    pub nickname: String,
    /// App the registration happens on behalf of; auto-granted
    pub app_key: String,
}

/// Login input; exactly one of `password` / `verification_code` is set
#[derive(Debug, Clone)]
pub struct LoginParams {
    /// Login email
    pub email: String,
    /// Password-login secret
    pub password: Option<String>,
    /// Email-code-login secret
    pub verification_code: Option<String>,
    /// Requesting application
    pub app_key: String,
    /// Device the login happens from
    pub device: DeviceDescriptor,
}

/// Core authentication service
#[derive(Clone)]
pub struct AuthService {
    database: Database,
    kv: Kv,
    codec: Arc<TokenCodec>,
    devices: DeviceManager,
    mailer: Mailer,
    default_avatar: String,
}

impl AuthService {
    /// Assemble the service from shared resources
    #[must_use]
    pub fn new(
        database: Database,
        kv: Kv,
        codec: Arc<TokenCodec>,
        mailer: Mailer,
        default_avatar: String,
    ) -> Self {
        let devices = DeviceManager::new(database.clone(), kv.clone());
        Self {
            database,
            kv,
            codec,
            devices,
            mailer,
            default_avatar,
        }
    }

    /// The device manager this service registers through
    #[must_use]
    pub const fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Access-token lifetime in seconds (the `expires_in` of token responses)
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.codec.access_ttl_secs()
    }

    /// Resolve an enabled application by key
    ///
    /// # Errors
    ///
    /// `AppNotFound` when unknown or disabled.
    pub async fn get_app_by_key(&self, app_key: &str) -> AppResult<Application> {
        self.database
            .get_application_by_key(app_key)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::AppNotFound))
    }

    /// Register a new email account. The user row and the grant for the
    /// registering app commit together; no tokens are issued, the client
    /// proceeds through the login path.
    ///
    /// # Errors
    ///
    /// `RegisterFailed` on duplicate email, `AppNotFound` on unknown app.
    pub async fn register(&self, params: &RegisterParams) -> AppResult<UserInfo> {
        if self
            .database
            .get_user_by_email(&params.email)
            .await?
            .is_some()
        {
            return Err(AppError::new(ErrorCode::RegisterFailed, "邮箱已被注册"));
        }

        let app = self.get_app_by_key(&params.app_key).await?;
        let password_hash = hash_password(&params.password)?;

        let user = self
            .database
            .create_user_with_grant(
                &NewUser {
                    uuid: Uuid::new_v4(),
                    username: &params.email,
                    password_hash: Some(&password_hash),
                    email: Some(&params.email),
                    nickname: &params.nickname,
                    avatar: &self.default_avatar,
                    register_source: RegisterSource::Email,
                },
                app.id,
            )
            .await?;

        Ok(UserInfo::from(&user))
    }

    /// Interactive login with a password or an email verification code.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` uniformly on unknown email or wrong password;
    /// account/grant/app/device errors as their own kinds.
    pub async fn login(&self, params: &LoginParams) -> AppResult<TokenResponse> {
        let user = self
            .database
            .get_user_by_email(&params.email)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::InvalidCredentials))?;

        if let Some(password) = params.password.as_deref() {
            if !verify_password(password, user.password_hash.as_deref()) {
                return Err(AppError::from_code(ErrorCode::InvalidCredentials));
            }
        } else if let Some(code) = params.verification_code.as_deref() {
            self.consume_email_code(&params.email, code).await?;
        } else {
            return Err(AppError::bad_request("请提供密码或邮箱验证码"));
        }

        check_user_status(&user)?;

        let app = self.get_app_by_key(&params.app_key).await?;
        self.ensure_grant(user.uuid, app.id).await?;

        let mut device = params.device.clone();
        if device.device_id.is_empty() {
            device.device_id = Uuid::new_v4().to_string();
        }

        let registration = self
            .devices
            .register_or_touch(user.uuid, app.id, &device, app.max_devices)
            .await?;

        // Credentials were just proven; a kicked device may come back through
        // this door, never through the token-only paths
        self.devices.clear_blacklist(&device.device_id).await?;

        let (access_token, refresh_token) = self
            .issue_token_pair(user.uuid, &app.app_key, &device.device_id)
            .await?;

        self.log_action(&NewLoginLog {
            user_uuid: user.uuid,
            app_id: app.id,
            action: LoginAction::Login.as_str(),
            device_id: &device.device_id,
            ip_address: &device.ip_address,
            user_agent: &device.user_agent,
            status: 1,
            message: if registration.created {
                "新设备登录成功"
            } else {
                "登录成功"
            },
        })
        .await;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            user_info: Some(UserInfo::from(&user)),
        })
    }

    /// Mint a fresh token pair for an already-authenticated session (silent
    /// login). Runs the same grant/device/issuance path as interactive login.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, account/grant/app/device errors as their own kinds.
    pub async fn issue_tokens_for_user(
        &self,
        user_uuid: Uuid,
        app_key: &str,
        device: &DeviceDescriptor,
    ) -> AppResult<TokenResponse> {
        // A kicked device never silently re-enters: no fresh credentials
        // were presented on this path
        if !device.device_id.is_empty() && self.devices.is_blacklisted(&device.device_id).await? {
            return Err(AppError::from_code(ErrorCode::DeviceRevoked));
        }

        let user = self
            .database
            .get_user_by_uuid(user_uuid)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::UserNotFound))?;
        check_user_status(&user)?;

        let app = self.get_app_by_key(app_key).await?;
        self.ensure_grant(user.uuid, app.id).await?;

        let mut device = device.clone();
        if device.device_id.is_empty() {
            device.device_id = Uuid::new_v4().to_string();
        }

        self.devices
            .register_or_touch(user.uuid, app.id, &device, app.max_devices)
            .await?;

        let (access_token, refresh_token) = self
            .issue_token_pair(user.uuid, &app.app_key, &device.device_id)
            .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            user_info: None,
        })
    }

    /// Refresh-token rotation.
    ///
    /// The binding check — token's `app_id` claim equals the caller's
    /// `client_id` — fires before the secret is even looked at, so a token
    /// minted for app A can never be redeemed with app B's credentials.
    ///
    /// # Errors
    ///
    /// `RefreshInvalid`, `ClientCredentialsInvalid`, `AccountDisabled`,
    /// `DeviceRevoked` or `TokenRevoked` depending on what rejected the call.
    pub async fn refresh_token(
        &self,
        presented: &str,
        client_id: &str,
        client_secret: &str,
    ) -> AppResult<TokenResponse> {
        if presented.is_empty() {
            return Err(AppError::bad_request("refresh_token不能为空"));
        }

        let claims = self
            .codec
            .parse(TokenKind::Refresh, presented)
            .map_err(|e| match e {
                TokenValidationError::Expired => AppError::new(
                    ErrorCode::RefreshInvalid,
                    "refresh_token已过期，请重新登录",
                ),
                _ => AppError::from_code(ErrorCode::RefreshInvalid),
            })?;

        if claims.app_id != client_id {
            tracing::warn!(
                req_client_id = client_id,
                claims_app_id = %claims.app_id,
                "refresh binding check failed: client_id does not match token app_id"
            );
            return Err(AppError::new(
                ErrorCode::ClientCredentialsInvalid,
                "client_id与token不匹配",
            ));
        }

        let app = self.get_app_by_key(&claims.app_id).await?;
        if app
            .app_secret
            .as_bytes()
            .ct_eq(client_secret.as_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(AppError::new(
                ErrorCode::ClientCredentialsInvalid,
                "client_secret错误",
            ));
        }

        let user = self
            .database
            .get_user_by_uuid(claims.user_uuid)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::UserNotFound))?;
        if user.status != UserStatus::Active {
            return Err(AppError::new(
                ErrorCode::AccountDisabled,
                "账号已被禁用或注销",
            ));
        }

        self.database
            .get_online_device(user.uuid, app.id, &claims.device_id)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::DeviceRevoked))?;

        // Rotation revocation: only the currently stored handle refreshes
        let stored = self
            .kv
            .get(&keys::refresh_token(user.uuid, &claims.device_id))
            .await?;
        if stored.as_deref() != Some(presented) {
            return Err(AppError::new(ErrorCode::TokenRevoked, "refresh_token已失效"));
        }

        let (access_token, refresh_token) = self
            .issue_token_pair(user.uuid, &app.app_key, &claims.device_id)
            .await?;

        if let Err(e) = self
            .database
            .touch_device(user.uuid, app.id, &claims.device_id, Utc::now())
            .await
        {
            tracing::error!(device_id = %claims.device_id, "failed to touch device on refresh: {e}");
        }

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            user_info: None,
        })
    }

    /// Per-app logout: blacklist the access token for its remaining life,
    /// drop the refresh handle, flip the device offline (scoped by app) and
    /// append the audit row. The SSO session survives; only the global
    /// logout touches it.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when the presented token does not verify at all.
    pub async fn logout(&self, access_token: &str, ip_address: &str, user_agent: &str) -> AppResult<()> {
        // Expiry is ignored: a just-expired token must still log out cleanly
        let claims = self
            .codec
            .parse_ignoring_expiry(TokenKind::Access, access_token)
            .map_err(|_| AppError::new(ErrorCode::TokenInvalid, "Token无效"))?;

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining > 0 {
            self.kv
                .set(
                    &keys::token_blacklist(access_token),
                    "1",
                    Some(std::time::Duration::from_secs(remaining as u64)),
                )
                .await?;
        }

        self.kv
            .delete(&keys::refresh_token(claims.user_uuid, &claims.device_id))
            .await?;

        let app_id = match self.database.get_application_by_key(&claims.app_id).await? {
            Some(app) => {
                self.database
                    .set_device_status(
                        claims.user_uuid,
                        app.id,
                        &claims.device_id,
                        device_status::OFFLINE,
                    )
                    .await?;
                app.id
            }
            None => 0,
        };

        self.log_action(&NewLoginLog {
            user_uuid: claims.user_uuid,
            app_id,
            action: LoginAction::Logout.as_str(),
            device_id: &claims.device_id,
            ip_address,
            user_agent,
            status: 1,
            message: "登出成功",
        })
        .await;

        Ok(())
    }

    /// Generate, store and mail an email verification code. Mail failures do
    /// not fail the call: the code is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV write fails.
    pub async fn send_email_verification_code(&self, email: &str) -> AppResult<()> {
        let code = generate_verification_code(6);
        self.kv
            .set(
                &keys::email_verification_code(email),
                &code,
                Some(keys::SHORT_TTL),
            )
            .await?;
        self.mailer.send_verification_code(email, &code).await;
        Ok(())
    }

    /// Reset a forgotten password after verifying the email code
    ///
    /// # Errors
    ///
    /// `VerificationCodeInvalid` or `BadRequest` on unknown email.
    pub async fn forgot_password(
        &self,
        email: &str,
        verification_code: &str,
        new_password: &str,
    ) -> AppResult<()> {
        self.consume_email_code(email, verification_code).await?;

        let user = self
            .database
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::bad_request("邮箱不存在"))?;

        let password_hash = hash_password(new_password)?;
        self.database
            .update_user_password(user.uuid, &password_hash)
            .await
    }

    /// Public profile by uuid
    ///
    /// # Errors
    ///
    /// `UserNotFound` when the uuid is unknown.
    pub async fn get_user_info(&self, user_uuid: Uuid) -> AppResult<UserInfo> {
        let user = self
            .database
            .get_user_by_uuid(user_uuid)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::UserNotFound))?;
        Ok(UserInfo::from(&user))
    }

    /// Update the provided profile fields
    ///
    /// # Errors
    ///
    /// `BadRequest` when nothing was provided.
    pub async fn update_user_info(
        &self,
        user_uuid: Uuid,
        nickname: Option<&str>,
        avatar: Option<&str>,
        address: Option<&str>,
        signature: Option<&str>,
    ) -> AppResult<()> {
        if nickname.is_none() && avatar.is_none() && address.is_none() && signature.is_none() {
            return Err(AppError::bad_request("没有需要更新的内容"));
        }
        self.database
            .update_user_profile(user_uuid, nickname, avatar, address, signature)
            .await
    }

    /// Change the password after verifying the current one
    ///
    /// # Errors
    ///
    /// `BadRequest` on a wrong current password.
    pub async fn update_password(
        &self,
        user_uuid: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self
            .database
            .get_user_by_uuid(user_uuid)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::UserNotFound))?;

        if !verify_password(old_password, user.password_hash.as_deref()) {
            return Err(AppError::bad_request("原密码错误"));
        }

        let password_hash = hash_password(new_password)?;
        self.database
            .update_user_password(user.uuid, &password_hash)
            .await
    }

    /// Grant lookup with auto-create: absent grants are created allowed on
    /// the login paths; only an explicit denied row blocks the app.
    ///
    /// # Errors
    ///
    /// `AppAccessDenied` on a denied grant.
    pub async fn ensure_grant(&self, user_uuid: Uuid, app_id: i64) -> AppResult<()> {
        match self.database.get_grant(user_uuid, app_id).await? {
            Some(grant) if grant.is_allowed() => Ok(()),
            Some(_) => Err(AppError::from_code(ErrorCode::AppAccessDenied)),
            None => self.database.create_grant(user_uuid, app_id).await,
        }
    }

    /// Mint an access+refresh pair and store the refresh revocation handle.
    /// The KV write happens on every issuance so the refresh path's check is
    /// always meaningful.
    ///
    /// # Errors
    ///
    /// Returns an error if minting or the KV write fails.
    pub async fn issue_token_pair(
        &self,
        user_uuid: Uuid,
        app_key: &str,
        device_id: &str,
    ) -> AppResult<(String, String)> {
        let access = self
            .codec
            .mint(TokenKind::Access, user_uuid, app_key, device_id)
            .map_err(|e| AppError::internal(format!("failed to mint access token: {e}")))?;
        let refresh = self
            .codec
            .mint(TokenKind::Refresh, user_uuid, app_key, device_id)
            .map_err(|e| AppError::internal(format!("failed to mint refresh token: {e}")))?;

        self.kv
            .set(
                &keys::refresh_token(user_uuid, device_id),
                &refresh,
                Some(std::time::Duration::from_secs(
                    self.codec.refresh_ttl_secs() as u64,
                )),
            )
            .await?;

        Ok((access, refresh))
    }

    /// Consume an email verification code: the first successful compare
    /// deletes the key, later attempts fail as expired.
    async fn consume_email_code(&self, email: &str, code: &str) -> AppResult<()> {
        let key = keys::email_verification_code(email);
        let stored = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::VerificationCodeInvalid))?;
        if stored != code {
            return Err(AppError::from_code(ErrorCode::VerificationCodeInvalid));
        }
        self.kv.delete(&key).await?;
        Ok(())
    }

    /// Append an audit row, reporting instead of failing on error
    pub(crate) async fn log_action(&self, log: &NewLoginLog<'_>) {
        if let Err(e) = self.database.insert_login_log(log).await {
            tracing::error!(action = log.action, "failed to write login log: {e}");
        }
    }
}

/// Reject disabled and deactivated accounts with their own messages
fn check_user_status(user: &User) -> AppResult<()> {
    match user.status {
        UserStatus::Active => Ok(()),
        UserStatus::Disabled => Err(AppError::from_code(ErrorCode::AccountDisabled)),
        UserStatus::Deactivated => Err(AppError::from_code(ErrorCode::AccountDeactivated)),
    }
}
