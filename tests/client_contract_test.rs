// ABOUTME: Client-integration contract tests: offline verification and app-key rejection
// ABOUTME: A relying app must never accept another app's token, expired means refresh
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use sso_auth_server::auth::{TokenKind, TokenValidationError};
use sso_auth_server::client::{
    SsoTokenVerifier, NEW_ACCESS_TOKEN_HEADER, TOKEN_EXPIRES_IN_HEADER,
};
use uuid::Uuid;

fn blog_verifier() -> SsoTokenVerifier {
    let (_, public_pem) = common::test_key_pems();
    SsoTokenVerifier::from_public_key_pem(public_pem.as_bytes(), common::TEST_ISSUER, "blog")
        .unwrap()
}

#[test]
fn own_app_tokens_verify_offline() {
    let codec = common::test_codec();
    let user = Uuid::new_v4();
    let token = codec
        .mint(TokenKind::Access, user, "blog", "dev-1")
        .unwrap();

    let claims = blog_verifier().verify(&token).unwrap();
    assert_eq!(claims.user_uuid, user);
    assert_eq!(claims.app_id, "blog");
}

#[test]
fn other_apps_tokens_are_rejected() {
    let codec = common::test_codec();
    let token = codec
        .mint(TokenKind::Access, Uuid::new_v4(), "admin", "dev-1")
        .unwrap();

    let err = blog_verifier().verify(&token).unwrap_err();
    assert!(matches!(err, TokenValidationError::Invalid { .. }));
}

#[test]
fn refresh_tokens_never_pass_as_access_tokens() {
    let codec = common::test_codec();
    let token = codec
        .mint(TokenKind::Refresh, Uuid::new_v4(), "blog", "dev-1")
        .unwrap();

    let err = blog_verifier().verify(&token).unwrap_err();
    assert!(matches!(err, TokenValidationError::Invalid { .. }));
}

#[test]
fn expiry_is_the_refresh_signal() {
    let codec = common::test_codec();
    let token = codec
        .mint_with_ttl(
            TokenKind::Access,
            Uuid::new_v4(),
            "blog",
            "dev-1",
            Duration::seconds(-120),
        )
        .unwrap();

    let err = blog_verifier().verify(&token).unwrap_err();
    assert!(matches!(err, TokenValidationError::Expired));
}

#[test]
fn silent_refresh_headers_are_stable() {
    // Relying apps and their browsers agree on these names
    assert_eq!(NEW_ACCESS_TOKEN_HEADER, "X-New-Access-Token");
    assert_eq!(TOKEN_EXPIRES_IN_HEADER, "X-Token-Expires-In");
}
