// ABOUTME: In-memory KV backend with lazy TTL expiry for tests and single-node development
// ABOUTME: DashMap-based; expired entries are dropped on access
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::KvBackend;
use crate::errors::AppResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_owned(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory KV store with per-entry TTLs
///
/// Expiry is lazy: entries past their deadline are removed when touched.
/// Good enough for tests and development; deployments use Redis.
#[derive(Clone, Default)]
pub struct MemoryKv {
    store: Arc<DashMap<String, Entry>>,
}

impl MemoryKv {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry);
                self.store.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

#[async_trait::async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.get_live(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.store.insert(key.to_owned(), Entry::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<bool> {
        // entry() holds the shard lock, making check-and-insert atomic
        let mut written = false;
        let mut entry = self
            .store
            .entry(key.to_owned())
            .or_insert_with(|| {
                written = true;
                Entry::new(value, ttl)
            });
        if !written && entry.is_expired() {
            *entry = Entry::new(value, ttl);
            written = true;
        }
        Ok(written)
    }

    async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .store
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get_live(key).is_some())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}
