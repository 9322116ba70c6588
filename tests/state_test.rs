// ABOUTME: Tests for the state envelope: round trips, expiry boundary, replay, whitelist
// ABOUTME: Whitelist matching ignores query strings and rejects foreign hosts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Utc;
use sso_auth_server::errors::ErrorCode;
use sso_auth_server::state::{decode_state, encode_state, StateData};

fn state_data(nonce: &str, exp_offset: i64) -> StateData {
    let now = Utc::now().timestamp();
    StateData {
        nonce: nonce.to_owned(),
        app_id: "blog".to_owned(),
        device_id: "dev-1".to_owned(),
        redirect_uri: "https://b.example/callback".to_owned(),
        return_url: "/home".to_owned(),
        iat: now,
        exp: now + exp_offset,
    }
}

#[test]
fn encode_decode_round_trips_all_fields() {
    let data = state_data("n1", 300);
    let encoded = encode_state(&data).unwrap();
    let decoded = decode_state(&encoded).unwrap();

    assert_eq!(decoded.nonce, "n1");
    assert_eq!(decoded.app_id, "blog");
    assert_eq!(decoded.device_id, "dev-1");
    assert_eq!(decoded.redirect_uri, "https://b.example/callback");
    assert_eq!(decoded.return_url, "/home");
    assert_eq!(decoded.iat, data.iat);
    assert_eq!(decoded.exp, data.exp);
}

#[test]
fn encode_rejects_missing_required_fields() {
    let mut data = state_data("n1", 300);
    data.redirect_uri = String::new();
    assert!(encode_state(&data).is_err());
}

#[tokio::test]
async fn verify_accepts_a_fresh_state() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 5).await;

    let encoded = encode_state(&state_data("fresh-nonce", 300)).unwrap();
    let data = resources.state.verify(&encoded).await.unwrap();
    assert_eq!(data.app_id, "blog");
}

#[tokio::test]
async fn nonce_replay_is_rejected() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 5).await;

    let encoded = encode_state(&state_data("replayed-nonce", 300)).unwrap();
    resources.state.verify(&encoded).await.unwrap();

    let err = resources.state.verify(&encoded).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StateInvalid);
    assert!(err.message.contains("已被使用"), "got: {}", err.message);
}

#[tokio::test]
async fn exp_equal_to_now_is_already_expired() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 5).await;

    let encoded = encode_state(&state_data("boundary-nonce", 0)).unwrap();
    let err = resources.state.verify(&encoded).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StateInvalid);
    assert!(err.message.contains("已过期"), "got: {}", err.message);
}

#[tokio::test]
async fn whitelist_ignores_query_string_differences() {
    let resources = common::test_resources().await;
    common::seed_app(
        &resources,
        "blog",
        "S",
        "https://b.example/callback?from=login",
        5,
    )
    .await;

    let mut data = state_data("query-nonce", 300);
    data.redirect_uri = "https://b.example/callback?code=x&foo=bar".to_owned();
    let encoded = encode_state(&data).unwrap();

    resources.state.verify(&encoded).await.unwrap();
}

#[tokio::test]
async fn whitelist_rejects_foreign_hosts_and_paths() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", "https://b.example/callback", 5).await;

    for bad in [
        "https://evil.example/callback",
        "https://b.example/other",
        "http://b.example/callback",
    ] {
        let mut data = state_data(&format!("wl-{bad}"), 300);
        data.redirect_uri = bad.to_owned();
        let encoded = encode_state(&data).unwrap();

        let err = resources.state.verify(&encoded).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StateInvalid, "accepted: {bad}");
    }
}

#[tokio::test]
async fn unknown_app_is_rejected() {
    let resources = common::test_resources().await;

    let encoded = encode_state(&state_data("noapp-nonce", 300)).unwrap();
    let err = resources.state.verify(&encoded).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AppNotFound);
}

#[test]
fn undecodable_state_is_malformed() {
    assert!(decode_state("").is_err());
    assert!(decode_state("%%%not-base64%%%").is_err());
}
