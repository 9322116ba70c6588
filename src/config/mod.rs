// ABOUTME: Configuration module grouping environment-derived server settings
// ABOUTME: All configuration is read once at startup and immutable afterwards
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Environment-based configuration management
pub mod environment;

pub use environment::{Environment, ServerConfig};
