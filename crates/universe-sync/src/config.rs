//! Node configuration
//!
//! Plain structs with defaults. The daemon fills them from its flags.

use std::time::Duration;
use universe_core::SyncMode;

/// Limits for pull reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Deadline for one whole sync invocation
    pub sync_timeout: Duration,
    /// Universes reconciled in parallel within one invocation
    pub max_concurrent_universes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(60),
            max_concurrent_universes: 8,
        }
    }
}

/// Retry behaviour of federation pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per peer per push, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
    /// Deadline for a single push attempt
    pub push_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2,
            push_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationConfig {
    pub retry: RetryPolicy,
    /// Pull from a server as soon as it joins the federation
    pub sync_on_add: bool,
    /// Pull from every member on this interval; `None` disables it
    pub sync_interval: Option<Duration>,
    /// Mode used for federation-initiated pulls
    pub sync_mode: SyncMode,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            sync_on_add: true,
            sync_interval: None,
            sync_mode: SyncMode::Full,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub sync: SyncConfig,
    pub federation: FederationConfig,
}
