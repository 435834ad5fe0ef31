//! Engine configuration: lifetimes, windows, identity policy, and
//! derivation contexts.

use crate::encoding::{DerivationContext, IdentityPolicy};
use std::time::Duration;

const DEFAULT_ACCESS_LIFETIME_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_LIFETIME_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_CHALLENGE_LIFETIME_SECONDS: u64 = 60;
const DEFAULT_ACCESS_WINDOW_SECONDS: u64 = 30;
const DEFAULT_STORE_TIMEOUT_MILLIS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    challenge_lifetime: Duration,
    access_window: Duration,
    store_timeout: Duration,
    identity_policy: IdentityPolicy,
    derivation: DerivationContext,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_lifetime: Duration::from_secs(DEFAULT_ACCESS_LIFETIME_SECONDS),
            refresh_lifetime: Duration::from_secs(DEFAULT_REFRESH_LIFETIME_SECONDS),
            challenge_lifetime: Duration::from_secs(DEFAULT_CHALLENGE_LIFETIME_SECONDS),
            access_window: Duration::from_secs(DEFAULT_ACCESS_WINDOW_SECONDS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MILLIS),
            identity_policy: IdentityPolicy::default(),
            derivation: DerivationContext::default(),
        }
    }

    #[must_use]
    pub const fn with_access_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_lifetime = lifetime;
        self
    }

    #[must_use]
    pub const fn with_refresh_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_lifetime = lifetime;
        self
    }

    #[must_use]
    pub const fn with_challenge_lifetime(mut self, lifetime: Duration) -> Self {
        self.challenge_lifetime = lifetime;
        self
    }

    #[must_use]
    pub const fn with_access_window(mut self, window: Duration) -> Self {
        self.access_window = window;
        self
    }

    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }

    #[must_use]
    pub fn with_derivation_context(mut self, context: DerivationContext) -> Self {
        self.derivation = context;
        self
    }

    #[must_use]
    pub const fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    #[must_use]
    pub const fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }

    #[must_use]
    pub const fn challenge_lifetime(&self) -> Duration {
        self.challenge_lifetime
    }

    #[must_use]
    pub const fn access_window(&self) -> Duration {
        self.access_window
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub const fn identity_policy(&self) -> IdentityPolicy {
        self.identity_policy
    }

    #[must_use]
    pub const fn derivation_context(&self) -> &DerivationContext {
        &self.derivation
    }
}
