// ABOUTME: Shared test harness: in-memory SQLite + memory KV + a generated RSA keypair
// ABOUTME: Builders for seeded applications, registered users and state envelopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::Utc;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sso_auth_server::auth::TokenCodec;
use sso_auth_server::cache::Kv;
use sso_auth_server::config::environment::{
    CaptchaConfig, DatabaseConfig, EmailConfig, JwtConfig, QqConfig, ServerConfig, SessionConfig,
};
use sso_auth_server::config::Environment;
use sso_auth_server::database::Database;
use sso_auth_server::mail::Mailer;
use sso_auth_server::models::Application;
use sso_auth_server::resources::ServerResources;
use sso_auth_server::services::auth::RegisterParams;
use sso_auth_server::state::{encode_state, StateData};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub const TEST_ISSUER: &str = "sso-auth-server";
pub const ACCESS_TTL_SECS: i64 = 7_200;
pub const REFRESH_TTL_SECS: i64 = 604_800;

static TEST_KEYS: OnceLock<(String, String)> = OnceLock::new();

/// One RSA keypair per test binary; generation is the slow part
pub fn test_key_pems() -> &'static (String, String) {
    TEST_KEYS.get_or_init(|| {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation failed");
        let public = RsaPublicKey::from(&private);
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private PEM encoding failed")
            .to_string();
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .expect("public PEM encoding failed");
        (private_pem, public_pem)
    })
}

pub fn test_codec() -> TokenCodec {
    let (private_pem, public_pem) = test_key_pems();
    TokenCodec::from_pem(
        private_pem.as_bytes(),
        public_pem.as_bytes(),
        TEST_ISSUER,
        ACCESS_TTL_SECS,
        REFRESH_TTL_SECS,
    )
    .expect("test codec construction failed")
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        environment: Environment::Testing,
        router_prefix: "/api".to_owned(),
        login_url: "/login".to_owned(),
        allowed_origins: Vec::new(),
        default_avatar: "/static/default-avatar.png".to_owned(),
        database: DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
            max_connections: 1,
        },
        redis_url: None,
        jwt: JwtConfig {
            private_key_path: PathBuf::from("unused"),
            public_key_path: PathBuf::from("unused"),
            access_token_expiry_secs: ACCESS_TTL_SECS,
            refresh_token_expiry_secs: REFRESH_TTL_SECS,
            issuer: TEST_ISSUER.to_owned(),
        },
        session: SessionConfig {
            cookie_domain: String::new(),
            cookie_secure: false,
            strict_binding: false,
        },
        qq: QqConfig {
            enable: false,
            app_id: String::new(),
            app_key: String::new(),
            redirect_uri: String::new(),
        },
        email: EmailConfig {
            enable: false,
            host: String::new(),
            port: 465,
            from: String::new(),
            nickname: String::new(),
            secret: String::new(),
        },
        captcha: CaptchaConfig {
            height: 20,
            width: 80,
            length: 4,
        },
    }
}

/// Fully assembled resources over in-memory stores
pub async fn test_resources() -> Arc<ServerResources> {
    let config = test_config();
    let database = Database::connect(&config.database.url, config.database.max_connections)
        .await
        .expect("in-memory database failed");
    let kv = Kv::memory();
    let codec = Arc::new(test_codec());
    let mailer = Mailer::new(&config.email).expect("disabled mailer failed");
    ServerResources::from_parts(config, database, kv, codec, mailer)
}

/// Seed an enabled application and return it with its real row id
pub async fn seed_app(
    resources: &ServerResources,
    app_key: &str,
    app_secret: &str,
    redirect_uris: &str,
    max_devices: i64,
) -> Application {
    let mut app = Application {
        id: 0,
        app_key: app_key.to_owned(),
        app_name: format!("{app_key} app"),
        app_secret: app_secret.to_owned(),
        redirect_uris: redirect_uris.to_owned(),
        max_devices,
        allowed_origins: String::new(),
        status: 1,
        created_at: Utc::now(),
    };
    app.id = resources
        .database
        .create_application(&app)
        .await
        .expect("seeding application failed");
    app
}

/// Register a user through the auth core and return its uuid
pub async fn register_user(
    resources: &ServerResources,
    email: &str,
    password: &str,
    nickname: &str,
    app_key: &str,
) -> Uuid {
    let info = resources
        .auth_service()
        .register(&RegisterParams {
            email: email.to_owned(),
            password: password.to_owned(),
            nickname: nickname.to_owned(),
            app_key: app_key.to_owned(),
        })
        .await
        .expect("registration failed");
    Uuid::parse_str(&info.uuid).expect("registration returned bad uuid")
}

/// Encoded state envelope with a fresh random nonce
pub fn make_state(app_key: &str, device_id: &str, redirect_uri: &str) -> String {
    let now = Utc::now().timestamp();
    encode_state(&StateData {
        nonce: Uuid::new_v4().simple().to_string(),
        app_id: app_key.to_owned(),
        device_id: device_id.to_owned(),
        redirect_uri: redirect_uri.to_owned(),
        return_url: String::new(),
        iat: now,
        exp: now + 200,
    })
    .expect("state encoding failed")
}
