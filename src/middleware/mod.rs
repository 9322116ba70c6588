// ABOUTME: HTTP middleware: bearer access-token guard and internal client authentication
// ABOUTME: Guards attach typed request extensions consumed by the route handlers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Bearer access-token authentication for user-facing protected routes
pub mod auth;

/// `X-Client-ID`/`X-Client-Secret` authentication for the internal surface
pub mod client_auth;

pub use auth::{require_auth, AuthenticatedUser};
pub use client_auth::{require_client_auth, ClientApp};
