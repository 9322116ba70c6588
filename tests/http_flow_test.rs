// ABOUTME: HTTP-level flow tests through the assembled router: cold login, token exchange, silent login
// ABOUTME: Covers the authorize decision including sliding-expiry fallback to the login page
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sso_auth_server::cache::keys;
use sso_auth_server::resources::ServerResources;
use sso_auth_server::server::build_router;
use tower::ServiceExt;

const REDIRECT_URI: &str = "https://b.example/callback";

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Fetch a captcha and read its answer back out of the KV store
async fn solved_captcha(router: &Router, resources: &ServerResources) -> (String, String) {
    let (status, _, body) = send(
        router,
        Request::builder()
            .uri("/api/base/captcha")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let captcha_id = body["data"]["captcha_id"].as_str().unwrap().to_owned();
    let answer = resources
        .kv
        .get(&keys::captcha(&captcha_id))
        .await
        .unwrap()
        .unwrap();
    (captcha_id, answer)
}

/// Register and log in a@x.com against "blog"; returns (session cookie, authz code)
async fn cold_login(router: &Router, resources: &ServerResources) -> (String, String) {
    let (captcha_id, answer) = solved_captcha(router, resources).await;
    let (status, _, body) = send(
        router,
        post_json(
            "/api/auth/register",
            &json!({
                "email": "a@x.com",
                "password": "Password1",
                "nickname": "A",
                "app_id": "blog",
                "captcha_id": captcha_id,
                "captcha": answer,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    assert_eq!(body["code"], 0);

    let (captcha_id, answer) = solved_captcha(router, resources).await;
    let state = common::make_state("blog", "dev-1", REDIRECT_URI);
    let (status, headers, body) = send(
        router,
        post_json(
            "/api/auth/login",
            &json!({
                "email": "a@x.com",
                "password": "Password1",
                "captcha_id": captcha_id,
                "captcha": answer,
                "app_id": "blog",
                "state": state,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["redirect_uri"], REDIRECT_URI);

    let cookie = headers
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_owned();
    assert!(cookie.starts_with("sso_session="));

    let code = body["data"]["code"].as_str().unwrap().to_owned();
    (cookie, code)
}

#[tokio::test]
async fn cold_login_then_token_exchange_is_single_use() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    let router = build_router(resources.clone());

    let (_cookie, code) = cold_login(&router, &resources).await;

    let exchange = json!({
        "grant_type": "authorization_code",
        "code": code,
        "client_id": "blog",
        "client_secret": "S",
        "redirect_uri": REDIRECT_URI,
    });

    let (status, _, body) = send(&router, post_json("/api/auth/token", &exchange)).await;
    assert_eq!(status, StatusCode::OK, "exchange failed: {body}");
    assert_eq!(body["code"], 0);
    assert!(body["data"]["access_token"].as_str().unwrap().len() > 20);
    assert!(body["data"]["refresh_token"].as_str().unwrap().len() > 20);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], common::ACCESS_TTL_SECS);

    // The same code a second time answers the code-specific error
    let (status, _, body) = send(&router, post_json("/api/auth/token", &exchange)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1003);
}

#[tokio::test]
async fn silent_login_issues_a_code_without_interaction() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    let router = build_router(resources.clone());

    let (cookie, _) = cold_login(&router, &resources).await;
    let user = resources
        .database
        .get_user_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();

    // Backdate activity so the touch is observable
    let backdated = Utc::now() - Duration::hours(1);
    resources
        .database
        .touch_device(user.uuid, app.id, "dev-1", backdated)
        .await
        .unwrap();

    let uri = format!(
        "/api/oauth/authorize?app_id=blog&redirect_uri={}&state=fresh-echo",
        urlencoding::encode(REDIRECT_URI)
    );
    let (status, headers, _) = send(
        &router,
        Request::builder()
            .uri(&uri)
            .header(COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    let location = headers.get(LOCATION).unwrap().to_str().unwrap().to_owned();
    assert!(location.starts_with(&format!("{REDIRECT_URI}?code=")));
    assert!(location.ends_with("&state=fresh-echo"));

    // The silent hop refreshed the sliding-expiry anchor
    let device = resources
        .database
        .get_device(user.uuid, app.id, "dev-1")
        .await
        .unwrap()
        .unwrap();
    assert!(device.last_active_at > backdated + Duration::minutes(30));

    // The delivered code redeems into a token pair
    let code = location
        .split("code=")
        .nth(1)
        .unwrap()
        .split('&')
        .next()
        .unwrap();
    let (status, _, body) = send(
        &router,
        post_json(
            "/api/auth/token",
            &json!({
                "grant_type": "authorization_code",
                "code": code,
                "client_id": "blog",
                "client_secret": "S",
                "redirect_uri": REDIRECT_URI,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "exchange failed: {body}");
    assert_eq!(body["code"], 0);
}

#[tokio::test]
async fn expired_device_clears_the_session_and_falls_back_to_login() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    let router = build_router(resources.clone());

    let (cookie, _) = cold_login(&router, &resources).await;
    let user = resources
        .database
        .get_user_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();

    resources
        .database
        .touch_device(user.uuid, app.id, "dev-1", Utc::now() - Duration::days(8))
        .await
        .unwrap();

    let uri = format!(
        "/api/oauth/authorize?app_id=blog&redirect_uri={}&state=s",
        urlencoding::encode(REDIRECT_URI)
    );
    let (status, headers, _) = send(
        &router,
        Request::builder()
            .uri(&uri)
            .header(COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    let location = headers.get(LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("/login?app_id=blog"), "got {location}");

    // The session is gone: the next authorize goes straight to login
    let (status, headers, _) = send(
        &router,
        Request::builder()
            .uri(&uri)
            .header(COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
    assert!(headers
        .get(LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("/login?"));
}

#[tokio::test]
async fn authorize_without_a_session_redirects_to_login() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    let router = build_router(resources);

    let uri = format!(
        "/api/oauth/authorize?app_id=blog&redirect_uri={}&state=s1",
        urlencoding::encode(REDIRECT_URI)
    );
    let (status, headers, _) = send(
        &router,
        Request::builder().uri(&uri).body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    let location = headers.get(LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("/login?app_id=blog"));
    assert!(location.contains("state=s1"));
}

#[tokio::test]
async fn login_rejects_a_mismatched_app_id() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    common::seed_app(&resources, "wiki", "W", "https://w.example/cb", 2).await;
    let router = build_router(resources.clone());

    let (captcha_id, answer) = solved_captcha(&router, &resources).await;
    let state = common::make_state("blog", "dev-1", REDIRECT_URI);

    let (status, _, body) = send(
        &router,
        post_json(
            "/api/auth/login",
            &json!({
                "email": "a@x.com",
                "password": "Password1",
                "captcha_id": captcha_id,
                "captcha": answer,
                "app_id": "wiki",
                "state": state,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn internal_user_lookup_requires_client_credentials() {
    let resources = common::test_resources().await;
    common::seed_app(&resources, "blog", "S", REDIRECT_URI, 2).await;
    let router = build_router(resources.clone());
    let user = common::register_user(&resources, "a@x.com", "Password1", "A", "blog").await;

    // No headers: unauthorized
    let (status, _, _) = send(
        &router,
        Request::builder()
            .uri(format!("/api/internal/user/{user}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Wrong secret: rejected
    let (status, _, _) = send(
        &router,
        Request::builder()
            .uri(format!("/api/internal/user/{user}"))
            .header("X-Client-ID", "blog")
            .header("X-Client-Secret", "wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid application credentials: the profile comes back
    let (status, _, body) = send(
        &router,
        Request::builder()
            .uri(format!("/api/internal/user/{user}"))
            .header("X-Client-ID", "blog")
            .header("X-Client-Secret", "S")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["nickname"], "A");
    assert_eq!(body["data"]["uuid"], user.to_string());
}
