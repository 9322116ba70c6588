// ABOUTME: Utility helpers shared across routes and services
// ABOUTME: Client IP extraction and User-Agent device naming
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Client IP extraction from proxy headers
pub mod client_ip;

/// Device-name derivation from the User-Agent
pub mod user_agent;

pub use client_ip::client_ip;
pub use user_agent::device_name_from_user_agent;
