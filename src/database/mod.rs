// ABOUTME: Relational persistence layer over a sqlx SQLite pool
// ABOUTME: Schema migrations and per-domain query modules share one Database handle
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Relational storage for users, applications, devices, grants, OAuth
//! bindings and login logs. Each domain lives in its own module as an
//! `impl Database` block; migrations are inline `CREATE TABLE IF NOT EXISTS`
//! statements run once at startup.

mod applications;
mod devices;
mod grants;
mod login_logs;
mod oauth_bindings;
mod users;

pub use devices::DeviceRegistration;
pub use login_logs::{LogFilter, NewLoginLog};
pub(crate) use users::NewUser;

use crate::errors::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

/// Shared database handle; cheap to clone, pooled underneath
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is unusable, the pool cannot be created or
    /// a migration fails.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::config(format!("invalid DATABASE_URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    /// Underlying pool, used by domain modules
    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Verify connectivity
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(&self) -> AppResult<()> {
        self.migrate_users().await?;
        self.migrate_applications().await?;
        self.migrate_grants().await?;
        self.migrate_devices().await?;
        self.migrate_oauth_bindings().await?;
        self.migrate_login_logs().await?;
        Ok(())
    }
}

/// Parse a TEXT uuid column; storage corruption surfaces as a database error
pub(crate) fn parse_uuid_column(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::database(format!("corrupt uuid column: {e}")))
}
