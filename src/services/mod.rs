// ABOUTME: Domain service layer: auth core, device manager, code broker, manage and federated login
// ABOUTME: Services are cheap per-request views over the shared resource container
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Auth core: registration, login, refresh rotation, logout
pub mod auth;

/// Single-use authorization code broker
pub mod codes;

/// Device quota, LRU eviction, sliding expiry, kick and blacklist
pub mod devices;

/// Link-or-create federated login on top of the auth core
pub mod federated;

/// Device listing, manual kicks, SSO logout and audit logs
pub mod manage;

pub use auth::AuthService;
pub use codes::CodeBroker;
pub use devices::DeviceManager;
pub use federated::FederatedLoginService;
pub use manage::ManageService;
