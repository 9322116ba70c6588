// ABOUTME: Startup-initialized immutable dependency container threaded through all routes
// ABOUTME: Holds config, stores, token codec, session manager, providers and shared clients
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! The process-wide resource container. Everything in here is constructed
//! once at startup and shared read-only behind an `Arc`; no component mutates
//! it afterwards. Route handlers derive per-request service views from it.

use crate::auth::TokenCodec;
use crate::cache::{Kv, KvConfig};
use crate::captcha::CaptchaManager;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::federation::qq::QqProvider;
use crate::federation::ProviderRegistry;
use crate::mail::Mailer;
use crate::services::{AuthService, CodeBroker, DeviceManager, FederatedLoginService, ManageService};
use crate::session::SessionManager;
use crate::state::StateVerifier;
use std::sync::Arc;

/// Shared server dependencies
pub struct ServerResources {
    /// Environment-derived configuration
    pub config: ServerConfig,
    /// Relational store
    pub database: Database,
    /// Transient KV store
    pub kv: Kv,
    /// RS256 token codec
    pub codec: Arc<TokenCodec>,
    /// Browser session manager
    pub sessions: SessionManager,
    /// State envelope verifier
    pub state: StateVerifier,
    /// Captcha generator/verifier
    pub captcha: CaptchaManager,
    /// Verification-code mailer
    pub mailer: Mailer,
    /// Federated identity providers by tag
    pub providers: ProviderRegistry,
    /// QQ adapter kept concrete for its authorize-URL builder
    pub qq: Option<Arc<QqProvider>>,
}

impl ServerResources {
    /// Bootstrap every dependency from configuration: RSA keys from disk,
    /// database pool with migrations, KV backend, providers, mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if any dependency fails to initialize.
    pub async fn initialize(config: ServerConfig) -> AppResult<Arc<Self>> {
        let private_pem = tokio::fs::read(&config.jwt.private_key_path)
            .await
            .map_err(|e| {
                AppError::config(format!(
                    "cannot read {}: {e} (generate a keypair with sso-keygen)",
                    config.jwt.private_key_path.display()
                ))
            })?;
        let public_pem = tokio::fs::read(&config.jwt.public_key_path)
            .await
            .map_err(|e| {
                AppError::config(format!(
                    "cannot read {}: {e} (generate a keypair with sso-keygen)",
                    config.jwt.public_key_path.display()
                ))
            })?;

        let codec = Arc::new(
            TokenCodec::from_pem(
                &private_pem,
                &public_pem,
                config.jwt.issuer.clone(),
                config.jwt.access_token_expiry_secs,
                config.jwt.refresh_token_expiry_secs,
            )
            .map_err(|e| AppError::config(format!("unusable RSA keypair: {e}")))?,
        );

        let database =
            Database::connect(&config.database.url, config.database.max_connections).await?;

        let kv = Kv::new(KvConfig {
            redis_url: config.redis_url.clone(),
            ..KvConfig::default()
        })
        .await?;

        let mailer = Mailer::new(&config.email)?;

        Ok(Self::from_parts(config, database, kv, codec, mailer))
    }

    /// Assemble the container from pre-built parts (tests build in-memory
    /// stores and a generated keypair here).
    #[must_use]
    pub fn from_parts(
        config: ServerConfig,
        database: Database,
        kv: Kv,
        codec: Arc<TokenCodec>,
        mailer: Mailer,
    ) -> Arc<Self> {
        let http = reqwest::Client::new();

        let mut providers = ProviderRegistry::new();
        let qq = if config.qq.enable {
            let provider = Arc::new(QqProvider::new(http, config.qq.clone()));
            providers.register(provider.clone());
            Some(provider)
        } else {
            None
        };

        Arc::new(Self {
            sessions: SessionManager::new(kv.clone(), config.session.clone()),
            state: StateVerifier::new(kv.clone(), database.clone()),
            captcha: CaptchaManager::new(kv.clone(), config.captcha.clone()),
            providers,
            qq,
            config,
            database,
            kv,
            codec,
            mailer,
        })
    }

    /// Per-request auth core view
    #[must_use]
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.database.clone(),
            self.kv.clone(),
            self.codec.clone(),
            self.mailer.clone(),
            self.config.default_avatar.clone(),
        )
    }

    /// Per-request device manager view
    #[must_use]
    pub fn device_manager(&self) -> DeviceManager {
        DeviceManager::new(self.database.clone(), self.kv.clone())
    }

    /// Per-request code broker view
    #[must_use]
    pub fn code_broker(&self) -> CodeBroker {
        CodeBroker::new(self.kv.clone())
    }

    /// Per-request manage-surface view
    #[must_use]
    pub fn manage_service(&self) -> ManageService {
        ManageService::new(self.database.clone(), self.kv.clone())
    }

    /// Per-request federated login view
    #[must_use]
    pub fn federated_service(&self) -> FederatedLoginService {
        FederatedLoginService::new(
            self.database.clone(),
            self.auth_service(),
            self.providers.clone(),
            self.config.default_avatar.clone(),
        )
    }
}
