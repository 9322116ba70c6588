// ABOUTME: Server binary: configuration, logging, resource bootstrap, serve loop
// ABOUTME: Production-ready entry point with graceful shutdown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![forbid(unsafe_code)]

//! # SSO Authorization Server Binary
//!
//! Starts the single-sign-on authorization server: loads environment
//! configuration, initializes logging, bootstraps the resource container
//! (RSA keys, database, KV store, mailer, providers) and serves HTTP until
//! SIGTERM or ctrl-c.

use anyhow::Result;
use clap::Parser;
use sso_auth_server::{config::ServerConfig, logging, resources::ServerResources, server};
use tracing::info;

#[derive(Parser)]
#[command(name = "sso-auth-server")]
#[command(about = "Single-sign-on authorization server with OAuth 2.0 code flow")]
struct Args {
    /// Override the HTTP port from the environment
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init(config.environment)?;
    info!("starting sso-auth-server");
    info!("{}", config.summary());

    let resources = ServerResources::initialize(config)
        .await
        .map_err(|e| anyhow::anyhow!("bootstrap failed: {}", e.message))?;
    info!("resources initialized");

    server::run(resources)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {}", e.message))?;

    info!("shutdown complete");
    Ok(())
}
