// ABOUTME: KV store abstraction holding rotating secrets, blacklists, codes and sessions
// ABOUTME: Pluggable backends (Redis for deployment, in-memory for tests) behind one interface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! TTL-bound KV storage for the transient side of the data model: refresh
//! tokens, token/device blacklists, authorization codes, verification codes,
//! nonces, captchas and SSO sessions. All values are strings; structured
//! records are stored as JSON.

pub mod keys;
pub mod memory;
pub mod redis;

use crate::errors::AppResult;
use std::time::Duration;

use self::memory::MemoryKv;
use self::redis::RedisKv;

/// Backend contract shared by Redis and the in-memory store
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch a value
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store a value; `ttl` of `None` means no expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// Store only if absent (SET NX EX); returns whether the write happened
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<bool>;

    /// Atomically fetch and delete (GETDEL)
    async fn get_del(&self, key: &str) -> AppResult<Option<String>>;

    /// Delete a key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Whether a key currently exists
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> AppResult<()>;
}

/// KV configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Redis connection URL; `None` selects the in-memory backend
    pub redis_url: Option<String>,
    /// Initial-connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Per-command response timeout in seconds
    pub response_timeout_secs: u64,
    /// Retries before giving up on the initial connection
    pub initial_connection_retries: u32,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            connection_timeout_secs: 5,
            response_timeout_secs: 2,
            initial_connection_retries: 5,
        }
    }
}

/// Unified KV handle selected by configuration
#[derive(Clone)]
pub enum Kv {
    /// Redis-backed deployment store
    Redis(RedisKv),
    /// In-memory store for tests and single-node development
    Memory(MemoryKv),
}

impl Kv {
    /// Create a KV handle from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be established.
    pub async fn new(config: KvConfig) -> AppResult<Self> {
        match &config.redis_url {
            Some(_) => Ok(Self::Redis(RedisKv::connect(&config).await?)),
            None => {
                tracing::info!("no REDIS_URL configured, using in-memory KV store");
                Ok(Self::Memory(MemoryKv::new()))
            }
        }
    }

    /// In-memory handle for tests
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryKv::new())
    }

    fn backend(&self) -> &dyn KvBackend {
        match self {
            Self::Redis(kv) => kv,
            Self::Memory(kv) => kv,
        }
    }

    /// Fetch a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.backend().get(key).await
    }

    /// Store a value with an optional TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.backend().set(key, value, ttl).await
    }

    /// Store only if absent; returns whether the write happened
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<bool> {
        self.backend().set_nx(key, value, ttl).await
    }

    /// Atomically fetch and delete
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        self.backend().get_del(key).await
    }

    /// Delete a key
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.backend().delete(key).await
    }

    /// Whether a key currently exists
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn exists(&self, key: &str) -> AppResult<bool> {
        self.backend().exists(key).await
    }

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn health_check(&self) -> AppResult<()> {
        self.backend().health_check().await
    }
}
