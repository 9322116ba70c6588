// ABOUTME: Federated identity providers behind one capability trait
// ABOUTME: QQ is the first provider; others dispatch on the same registry without touching Auth Core
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Federated Login Providers
//!
//! Every OpenID-style provider is modeled as the same capability: exchange an
//! authorization code for an external identity, then fetch a display profile.
//! The login service dispatches on the provider tag; adding WeChat or GitHub
//! means one new implementation and one registry insert.

pub mod qq;

use crate::errors::AppResult;
use std::collections::HashMap;
use std::sync::Arc;

/// External identity resolved from a provider's code exchange
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Provider-scoped stable identity
    pub open_id: String,
    /// Cross-app identity where the provider supplies one
    pub union_id: Option<String>,
    /// Provider access token used for the profile fetch
    pub access_token: String,
}

/// Display profile fetched from the provider
#[derive(Debug, Clone, Default)]
pub struct ExternalProfile {
    /// Nickname, empty when the provider withheld it
    pub nickname: String,
    /// Avatar URL, empty when the provider withheld it
    pub avatar: String,
}

/// Capability every federated provider implements
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider tag stored in OAuth bindings ("qq", "wechat", "github")
    fn tag(&self) -> &'static str;

    /// Exchange the callback code for the external identity
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the code or is unreachable.
    async fn exchange_code(&self, code: &str) -> AppResult<ExternalIdentity>;

    /// Fetch the display profile for an identity
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable. Providers may answer
    /// with an empty profile rather than fail.
    async fn fetch_profile(&self, identity: &ExternalIdentity) -> AppResult<ExternalProfile>;
}

/// Provider registry dispatching on the provider tag
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own tag
    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.tag(), provider);
    }

    /// Look up a provider by tag
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(tag).cloned()
    }
}
