// ABOUTME: Authorization-code broker tests: issuance, single use, mismatch rejection
// ABOUTME: JSON storage must survive values containing quotes and slashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use sso_auth_server::errors::ErrorCode;

#[tokio::test]
async fn issued_codes_are_64_hex_chars() {
    let resources = common::test_resources().await;
    let broker = resources.code_broker();

    let code = broker
        .issue_code("u-1", "blog", "https://b.example/cb", "at", "rt")
        .await
        .unwrap();
    assert_eq!(code.len(), 64);
    assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn consume_round_trips_values_with_quotes_and_slashes() {
    let resources = common::test_resources().await;
    let broker = resources.code_broker();

    let redirect = "https://b.example/cb?path=/a/b&q=\"x\"";
    let code = broker
        .issue_code("u-1", "blog", redirect, "acc/ess\"token", "re/fresh\"token")
        .await
        .unwrap();

    let record = broker.consume_code(&code, "blog", redirect).await.unwrap();
    assert_eq!(record.user_uuid, "u-1");
    assert_eq!(record.access_token, "acc/ess\"token");
    assert_eq!(record.refresh_token, "re/fresh\"token");
}

#[tokio::test]
async fn unknown_codes_are_invalid() {
    let resources = common::test_resources().await;
    let err = resources
        .code_broker()
        .consume_code("deadbeef", "blog", "https://b.example/cb")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthCodeInvalid);
}

#[tokio::test]
async fn app_mismatch_is_rejected_and_burns_the_code() {
    let resources = common::test_resources().await;
    let broker = resources.code_broker();

    let code = broker
        .issue_code("u-1", "blog", "https://b.example/cb", "at", "rt")
        .await
        .unwrap();

    let err = broker
        .consume_code(&code, "admin", "https://b.example/cb")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthCodeInvalid);

    // Consumption is at-most-once even across mismatched attempts
    let err = broker
        .consume_code(&code, "blog", "https://b.example/cb")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthCodeInvalid);
}

#[tokio::test]
async fn redirect_mismatch_is_its_own_error() {
    let resources = common::test_resources().await;
    let broker = resources.code_broker();

    let code = broker
        .issue_code("u-1", "blog", "https://b.example/cb", "at", "rt")
        .await
        .unwrap();

    let err = broker
        .consume_code(&code, "blog", "https://evil.example/cb")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RedirectUriMismatch);
}
