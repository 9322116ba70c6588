// ABOUTME: Unit tests for the RS256 token codec
// ABOUTME: Round trips, kind mismatches, expiry boundaries and issuer rejection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use sso_auth_server::auth::{TokenCodec, TokenKind, TokenValidationError};
use uuid::Uuid;

#[test]
fn mint_then_parse_round_trips_claims() {
    let codec = common::test_codec();
    let user = Uuid::new_v4();

    let token = codec
        .mint(TokenKind::Access, user, "blog", "dev-1")
        .unwrap();
    let claims = codec.parse(TokenKind::Access, &token).unwrap();

    assert_eq!(claims.user_uuid, user);
    assert_eq!(claims.app_id, "blog");
    assert_eq!(claims.device_id, "dev-1");
    assert_eq!(claims.token_type, "access_token");
    assert_eq!(claims.iss, common::TEST_ISSUER);
    assert!(claims.exp > Utc::now().timestamp());
    assert_eq!(claims.exp - claims.iat, common::ACCESS_TTL_SECS);
}

#[test]
fn refresh_tokens_carry_their_own_type_and_ttl() {
    let codec = common::test_codec();
    let token = codec
        .mint(TokenKind::Refresh, Uuid::new_v4(), "blog", "dev-1")
        .unwrap();
    let claims = codec.parse(TokenKind::Refresh, &token).unwrap();

    assert_eq!(claims.token_type, "refresh_token");
    assert_eq!(claims.exp - claims.iat, common::REFRESH_TTL_SECS);
}

#[test]
fn kind_mismatch_is_rejected() {
    let codec = common::test_codec();
    let access = codec
        .mint(TokenKind::Access, Uuid::new_v4(), "blog", "dev-1")
        .unwrap();

    let err = codec.parse(TokenKind::Refresh, &access).unwrap_err();
    assert!(matches!(err, TokenValidationError::Invalid { .. }));
}

#[test]
fn expired_token_is_distinguishable_and_still_parses_without_expiry() {
    let codec = common::test_codec();
    let user = Uuid::new_v4();
    let token = codec
        .mint_with_ttl(
            TokenKind::Access,
            user,
            "blog",
            "dev-1",
            Duration::seconds(-120),
        )
        .unwrap();

    let err = codec.parse(TokenKind::Access, &token).unwrap_err();
    assert!(matches!(err, TokenValidationError::Expired));

    // The logout path still needs the claims of a just-expired token
    let claims = codec.parse_ignoring_expiry(TokenKind::Access, &token).unwrap();
    assert_eq!(claims.user_uuid, user);
    assert_eq!(claims.device_id, "dev-1");
}

#[test]
fn unknown_issuer_is_rejected() {
    let (private_pem, public_pem) = common::test_key_pems();
    let codec = common::test_codec();
    let other = TokenCodec::from_pem(
        private_pem.as_bytes(),
        public_pem.as_bytes(),
        "someone-else",
        3600,
        7200,
    )
    .unwrap();

    let token = other
        .mint(TokenKind::Access, Uuid::new_v4(), "blog", "dev-1")
        .unwrap();
    let err = codec.parse(TokenKind::Access, &token).unwrap_err();
    assert!(matches!(err, TokenValidationError::Invalid { .. }));
}

#[test]
fn garbage_is_malformed() {
    let codec = common::test_codec();
    let err = codec
        .parse(TokenKind::Access, "not-a-jwt-at-all")
        .unwrap_err();
    assert!(matches!(err, TokenValidationError::Malformed { .. }));
}

#[test]
fn tampered_payload_fails_signature() {
    let codec = common::test_codec();
    let token = codec
        .mint(TokenKind::Access, Uuid::new_v4(), "blog", "dev-1")
        .unwrap();

    // Flip a character in the payload segment
    let mut parts: Vec<String> = token.split('.').map(ToOwned::to_owned).collect();
    let mut payload: Vec<u8> = parts[1].clone().into_bytes();
    payload[4] = if payload[4] == b'A' { b'B' } else { b'A' };
    parts[1] = String::from_utf8(payload).unwrap();
    let tampered = parts.join(".");

    assert!(codec.parse(TokenKind::Access, &tampered).is_err());
}
