// ABOUTME: Logging configuration and structured logging setup
// ABOUTME: Pretty output in development, JSON in production, filter from RUST_LOG
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Production-ready logging configuration with structured output

use crate::config::Environment;
use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`; production
/// deployments emit JSON lines, everything else gets the pretty format.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init(environment: Environment) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match environment {
        Environment::Production => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .try_init()?;
        }
        Environment::Development | Environment::Testing => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_target(false))
                .try_init()?;
        }
    }

    Ok(())
}
