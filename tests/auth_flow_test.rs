// ABOUTME: End-to-end auth core tests: login, refresh rotation, cross-app binding, logout
// ABOUTME: Exercises the seed scenarios for cold login, rotation and the refresh attack
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use sso_auth_server::auth::TokenKind;
use sso_auth_server::cache::keys;
use sso_auth_server::errors::ErrorCode;
use sso_auth_server::services::auth::LoginParams;
use sso_auth_server::services::devices::DeviceDescriptor;

fn login_params(email: &str, password: &str, app_key: &str, device_id: &str) -> LoginParams {
    LoginParams {
        email: email.to_owned(),
        password: Some(password.to_owned()),
        verification_code: None,
        app_key: app_key.to_owned(),
        device: DeviceDescriptor {
            device_id: device_id.to_owned(),
            device_name: "macOS - Chrome".to_owned(),
            device_type: "web".to_owned(),
            ip_address: "127.0.0.1".to_owned(),
            user_agent: "test-agent".to_owned(),
        },
    }
}

#[tokio::test]
async fn cold_password_login_issues_a_bound_token_pair() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user =
        common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let response = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, common::ACCESS_TTL_SECS);
    assert_eq!(response.user_info.as_ref().unwrap().nickname, "A");

    // The app_key claim equals what the caller requested
    let claims = resources
        .codec
        .parse(TokenKind::Access, &response.access_token)
        .unwrap();
    assert_eq!(claims.app_id, "blog");
    assert_eq!(claims.device_id, "dev-1");
    assert_eq!(claims.user_uuid, user);

    // Every issuance writes the refresh revocation handle
    let stored = resources
        .kv
        .get(&keys::refresh_token(user, "dev-1"))
        .await
        .unwrap();
    assert_eq!(stored.as_deref(), Some(response.refresh_token.as_str()));
}

#[tokio::test]
async fn unknown_email_and_wrong_password_answer_identically() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let unknown = auth
        .login(&login_params("nobody@x.com", "Password1", "blog", "d"))
        .await
        .unwrap_err();
    let wrong = auth
        .login(&login_params("a@x.com", "WrongPass1", "blog", "d"))
        .await
        .unwrap_err();

    assert_eq!(unknown.code, ErrorCode::InvalidCredentials);
    assert_eq!(wrong.code, ErrorCode::InvalidCredentials);
    assert_eq!(unknown.message, wrong.message);
}

#[tokio::test]
async fn authorization_code_is_single_use() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let response = resources
        .auth_service()
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    let broker = resources.code_broker();
    let code = broker
        .issue_code(
            &user.to_string(),
            "blog",
            "https://b.example/callback",
            &response.access_token,
            &response.refresh_token,
        )
        .await
        .unwrap();

    let record = broker
        .consume_code(&code, "blog", "https://b.example/callback")
        .await
        .unwrap();
    assert_eq!(record.access_token, response.access_token);
    assert_eq!(record.refresh_token, response.refresh_token);

    // Second redemption of the same code fails
    let err = broker
        .consume_code(&code, "blog", "https://b.example/callback")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthCodeInvalid);
}

#[tokio::test]
async fn refresh_rotation_revokes_the_previous_token() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let first = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    let rotated = auth
        .refresh_token(&first.refresh_token, "blog", "S")
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, first.refresh_token);
    assert!(!rotated.access_token.is_empty());

    // The rotated-away token no longer matches the stored handle
    let err = auth
        .refresh_token(&first.refresh_token, "blog", "S")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRevoked);

    // The fresh one keeps working
    auth.refresh_token(&rotated.refresh_token, "blog", "S")
        .await
        .unwrap();
}

#[tokio::test]
async fn cross_app_refresh_is_stopped_by_the_binding_check() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::seed_app(&resources, "admin", "AdminSecret", "https://a.example/cb", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let response = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    // admin's perfectly valid credentials cannot redeem blog's token
    let err = auth
        .refresh_token(&response.refresh_token, "admin", "AdminSecret")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientCredentialsInvalid);
}

#[tokio::test]
async fn wrong_client_secret_is_rejected() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let response = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    let err = auth
        .refresh_token(&response.refresh_token, "blog", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientCredentialsInvalid);
}

#[tokio::test]
async fn logout_blacklists_the_token_and_drops_the_refresh_handle() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let response = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    auth.logout(&response.access_token, "127.0.0.1", "test-agent")
        .await
        .unwrap();

    assert!(resources
        .kv
        .exists(&keys::token_blacklist(&response.access_token))
        .await
        .unwrap());
    assert!(resources
        .kv
        .get(&keys::refresh_token(user, "dev-1"))
        .await
        .unwrap()
        .is_none());
    assert!(resources
        .database
        .get_online_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .is_none());

    // A logged-out refresh token cannot rotate either
    let err = auth
        .refresh_token(&response.refresh_token, "blog", "S")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);
}

#[tokio::test]
async fn login_auto_creates_the_grant_and_denied_grants_block() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let second = common::seed_app(&resources, "wiki", "W", "https://w.example/cb", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    // First login against an app the user never touched: grant auto-created
    let auth = resources.auth_service();
    auth.login(&login_params("a@x.com", "Password1", "wiki", "dev-w"))
        .await
        .unwrap();
    assert!(resources
        .database
        .get_grant(user, second.id)
        .await
        .unwrap()
        .unwrap()
        .is_allowed());

    // An explicit denial is the only per-user block
    resources
        .database
        .set_grant_status(user, second.id, 2)
        .await
        .unwrap();
    let err = auth
        .login(&login_params("a@x.com", "Password1", "wiki", "dev-w"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AppAccessDenied);
}

#[tokio::test]
async fn silent_issuance_registers_the_device_and_rotates_the_handle() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    let interactive = auth
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    let silent = auth
        .issue_tokens_for_user(
            user,
            "blog",
            &DeviceDescriptor {
                device_id: "dev-1".to_owned(),
                device_name: "SSO 设备".to_owned(),
                device_type: "web".to_owned(),
                ip_address: "127.0.0.1".to_owned(),
                user_agent: "test-agent".to_owned(),
            },
        )
        .await
        .unwrap();
    assert!(silent.user_info.is_none());

    // Still one device row; silent issuance touched it instead of inserting
    assert_eq!(
        resources.database.count_online_devices(user, app.id).await.unwrap(),
        1
    );

    // The silent issuance overwrote the stored handle, revoking the old one
    let err = auth
        .refresh_token(&interactive.refresh_token, "blog", "S")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRevoked);
    auth.refresh_token(&silent.refresh_token, "blog", "S")
        .await
        .unwrap();
}

#[tokio::test]
async fn email_code_login_consumes_the_code() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    // Plant the code directly; mail is disabled in tests
    resources
        .kv
        .set(&keys::email_verification_code("a@x.com"), "123456", None)
        .await
        .unwrap();

    let mut params = login_params("a@x.com", "unused", "blog", "dev-1");
    params.password = None;
    params.verification_code = Some("123456".to_owned());

    let auth = resources.auth_service();
    auth.login(&params).await.unwrap();

    // The code is gone after its first successful use
    let err = auth.login(&params).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::VerificationCodeInvalid);
}

#[tokio::test]
async fn kicked_devices_stay_out_of_the_silent_path_until_a_real_login() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    auth.login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    auth.devices()
        .kick(
            user,
            app.id,
            "dev-1",
            sso_auth_server::models::LoginAction::ManualKick,
            "管理员手动踢出",
            "",
            "",
        )
        .await
        .unwrap();

    let descriptor = DeviceDescriptor {
        device_id: "dev-1".to_owned(),
        device_name: "SSO 设备".to_owned(),
        device_type: "web".to_owned(),
        ip_address: "127.0.0.1".to_owned(),
        user_agent: "test-agent".to_owned(),
    };

    // Silent issuance carries no fresh credentials and is refused
    let err = auth
        .issue_tokens_for_user(user, "blog", &descriptor)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);

    // A credentialed login lifts the kick, then silent issuance works again
    auth.login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();
    assert!(!auth.devices().is_blacklisted("dev-1").await.unwrap());
    auth.issue_tokens_for_user(user, "blog", &descriptor)
        .await
        .unwrap();
}

#[tokio::test]
async fn logout_succeeds_with_a_just_expired_access_token() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let auth = resources.auth_service();
    auth.login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap();

    let expired = resources
        .codec
        .mint_with_ttl(
            TokenKind::Access,
            user,
            "blog",
            "dev-1",
            chrono::Duration::seconds(-120),
        )
        .unwrap();

    auth.logout(&expired, "127.0.0.1", "test-agent").await.unwrap();

    // The refresh handle is gone and the device is offline
    assert!(resources
        .kv
        .get(&keys::refresh_token(user, "dev-1"))
        .await
        .unwrap()
        .is_none());
    assert!(resources
        .database
        .get_online_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn disabled_accounts_cannot_log_in_but_get_a_distinct_message() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    let user = resources
        .database
        .get_user_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();
    resources
        .database
        .set_user_status(user.uuid, 2)
        .await
        .unwrap();

    let err = resources
        .auth_service()
        .login(&login_params("a@x.com", "Password1", "blog", "dev-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccountDisabled);
}
