// ABOUTME: Redis KV backend with connection manager and TTL support
// ABOUTME: Initial connection retries with exponential backoff before giving up
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{KvBackend, KvConfig};
use crate::errors::{AppError, AppResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

/// Redis-backed KV store
///
/// Uses `ConnectionManager` for automatic reconnection. TTL-bearing writes go
/// through `SET ... EX` / `SET ... NX EX` so value and expiry land atomically;
/// consumption reads use `GETDEL` so concurrent consumers race on the delete
/// and at most one of them observes the value.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis with retry
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or all connection attempts fail.
    pub async fn connect(config: &KvConfig) -> AppResult<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| AppError::config("REDIS_URL is required for the redis KV backend"))?;

        info!(
            "connecting to redis at {} (timeout={}s, retries={})",
            redis_url, config.connection_timeout_secs, config.initial_connection_retries
        );

        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| AppError::internal(format!("failed to create redis client: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .set_response_timeout(Duration::from_secs(config.response_timeout_secs));

        let manager = Self::connect_with_retry(&client, manager_config, config).await?;
        info!("redis connection established");

        Ok(Self { manager })
    }

    async fn connect_with_retry(
        client: &redis::Client,
        manager_config: ConnectionManagerConfig,
        config: &KvConfig,
    ) -> AppResult<ConnectionManager> {
        let max_retries = config.initial_connection_retries;
        let mut delay_ms: u64 = 250;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("redis connection established after {attempt} retries");
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries {
                        warn!(
                            "redis connection attempt {}/{} failed, retrying in {}ms",
                            attempt + 1,
                            max_retries + 1,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(5_000);
                    }
                }
            }
        }

        Err(AppError::internal(format!(
            "failed to connect to redis after {} attempts: {}",
            max_retries + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }
}

#[async_trait::async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        // SET NX answers OK when written, nil when the key already exists
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "unexpected PING reply: {reply}"
            )))
        }
    }
}
