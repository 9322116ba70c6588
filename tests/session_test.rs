// ABOUTME: Session manager tests: cookie round trip, clearing, corrupt payload handling
// ABOUTME: Runs against the in-memory KV store without HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use sso_auth_server::cache::keys;
use sso_auth_server::models::SessionData;
use sso_auth_server::session::SESSION_COOKIE;

fn session_data() -> SessionData {
    SessionData {
        user_uuid: "3f8a2a75-6f0e-4a52-9d4b-2d7b9d8f3c21".to_owned(),
        sso_device_id: "dev-1".to_owned(),
        user_agent: "test-agent".to_owned(),
        ip_address: "127.0.0.1".to_owned(),
        logged_in: true,
        logged_in_at: Utc::now().timestamp(),
    }
}

#[tokio::test]
async fn save_then_load_round_trips_the_session() {
    let resources = common::test_resources().await;
    let jar = CookieJar::new();

    let jar = resources.sessions.save(jar, &session_data()).await.unwrap();
    let cookie = jar.get(SESSION_COOKIE).unwrap();
    assert_eq!(cookie.value().len(), 64);

    let loaded = resources.sessions.load(&jar).await.unwrap().unwrap();
    assert_eq!(loaded.user_uuid, "3f8a2a75-6f0e-4a52-9d4b-2d7b9d8f3c21");
    assert_eq!(loaded.sso_device_id, "dev-1");
    assert!(loaded.logged_in);
}

#[tokio::test]
async fn missing_cookie_means_no_session() {
    let resources = common::test_resources().await;
    assert!(resources
        .sessions
        .load(&CookieJar::new())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn clear_drops_the_server_side_state() {
    let resources = common::test_resources().await;

    let jar = resources
        .sessions
        .save(CookieJar::new(), &session_data())
        .await
        .unwrap();
    let session_id = jar.get(SESSION_COOKIE).unwrap().value().to_owned();

    resources.sessions.clear(jar).await.unwrap();

    assert!(resources
        .kv
        .get(&keys::sso_session(&session_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn undecodable_payload_reads_as_logged_out() {
    let resources = common::test_resources().await;

    let jar = resources
        .sessions
        .save(CookieJar::new(), &session_data())
        .await
        .unwrap();
    let session_id = jar.get(SESSION_COOKIE).unwrap().value().to_owned();

    // Corrupt the stored payload behind the cookie
    resources
        .kv
        .set(&keys::sso_session(&session_id), "{not json", None)
        .await
        .unwrap();

    assert!(resources.sessions.load(&jar).await.unwrap().is_none());
}
