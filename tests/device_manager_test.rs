// ABOUTME: Device manager tests: quota with LRU eviction, sliding expiry, kick and blacklist
// ABOUTME: Covers the max_devices 0/1 boundaries and the auto_kick audit trail
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use sso_auth_server::errors::ErrorCode;
use sso_auth_server::models::LoginAction;
use sso_auth_server::services::devices::DeviceDescriptor;
use uuid::Uuid;

fn descriptor(device_id: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        device_id: device_id.to_owned(),
        device_name: "test device".to_owned(),
        device_type: "web".to_owned(),
        ip_address: "127.0.0.1".to_owned(),
        user_agent: "test-agent".to_owned(),
    }
}

#[tokio::test]
async fn quota_evicts_least_recently_active_device() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/callback", 2).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();
    devices
        .register_or_touch(user, app.id, &descriptor("dev-2"), app.max_devices)
        .await
        .unwrap();

    // Make dev-1 the strict LRU victim
    resources
        .database
        .touch_device(user, app.id, "dev-1", Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    let registration = devices
        .register_or_touch(user, app.id, &descriptor("dev-3"), app.max_devices)
        .await
        .unwrap();
    assert!(registration.created);
    assert_eq!(registration.evicted.len(), 1);
    assert_eq!(registration.evicted[0].device_id, "dev-1");

    let dev1 = resources
        .database
        .get_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!dev1.is_online());
    for online in ["dev-2", "dev-3"] {
        assert!(resources
            .database
            .get_online_device(user, app.id, online)
            .await
            .unwrap()
            .is_some());
    }

    // Invariant: never more online devices than the quota
    assert_eq!(
        resources.database.count_online_devices(user, app.id).await.unwrap(),
        2
    );

    // One auto_kick audit row for dev-1, and its tokens are revoked
    assert_eq!(
        resources
            .database
            .count_login_logs(user, LoginAction::AutoKick.as_str())
            .await
            .unwrap(),
        1
    );
    assert!(devices.is_blacklisted("dev-1").await.unwrap());
}

#[tokio::test]
async fn max_devices_one_means_every_login_evicts_the_previous() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "solo", "S", "https://s.example/cb", 1).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("first"), app.max_devices)
        .await
        .unwrap();
    let registration = devices
        .register_or_touch(user, app.id, &descriptor("second"), app.max_devices)
        .await
        .unwrap();

    assert_eq!(registration.evicted.len(), 1);
    assert_eq!(registration.evicted[0].device_id, "first");
    assert_eq!(
        resources.database.count_online_devices(user, app.id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn max_devices_zero_disables_login_entirely() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "closed", "S", "https://c.example/cb", 0).await;
    let user = Uuid::new_v4();

    let err = resources
        .device_manager()
        .register_or_touch(user, app.id, &descriptor("any"), app.max_devices)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceQuotaExceeded);
}

#[tokio::test]
async fn touching_an_existing_device_does_not_count_against_quota() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/cb", 1).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();
    let registration = devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();

    assert!(!registration.created);
    assert!(registration.evicted.is_empty());
}

#[tokio::test]
async fn sliding_expiry_kicks_devices_past_the_window() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/cb", 5).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();
    resources
        .database
        .touch_device(user, app.id, "dev-1", Utc::now() - Duration::days(8))
        .await
        .unwrap();

    let err = devices
        .check_sliding_expiry(user, app.id, "dev-1")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceExpired);

    let dev = resources
        .database
        .get_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!dev.is_online());
    assert_eq!(
        resources
            .database
            .count_login_logs(user, LoginAction::Expired.as_str())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn sliding_expiry_touches_devices_inside_the_window() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/cb", 5).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();
    let backdated = Utc::now() - Duration::days(3);
    resources
        .database
        .touch_device(user, app.id, "dev-1", backdated)
        .await
        .unwrap();

    devices
        .check_sliding_expiry(user, app.id, "dev-1")
        .await
        .unwrap();

    let dev = resources
        .database
        .get_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .unwrap();
    assert!(dev.last_active_at > backdated + Duration::days(2));
}

#[tokio::test]
async fn sliding_expiry_reports_missing_devices() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/cb", 5).await;

    let err = resources
        .device_manager()
        .check_sliding_expiry(Uuid::new_v4(), app.id, "ghost")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceNotFound);
}

#[tokio::test]
async fn kick_blacklists_and_flips_offline() {
    let resources = common::test_resources().await;
    let app = common::seed_app(&resources, "blog", "S", "https://b.example/cb", 5).await;
    let user = Uuid::new_v4();
    let devices = resources.device_manager();

    devices
        .register_or_touch(user, app.id, &descriptor("dev-1"), app.max_devices)
        .await
        .unwrap();
    devices
        .kick(
            user,
            app.id,
            "dev-1",
            LoginAction::ManualKick,
            "管理员手动踢出",
            "127.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();

    assert!(devices.is_blacklisted("dev-1").await.unwrap());
    assert!(resources
        .database
        .get_online_device(user, app.id, "dev-1")
        .await
        .unwrap()
        .is_none());

    // A second kick has nothing online to act on
    let err = devices
        .kick(
            user,
            app.id,
            "dev-1",
            LoginAction::ManualKick,
            "again",
            "",
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceNotFound);
}
