//! Per-resource configuration: hash strategy, consistency mode, compression,
//! and the auto-commit thresholds.
//!
//! Construct it directly for tests and embedding, or (behind the
//! `figment_config` feature) layer it from the environment the way a host
//! session would.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selects which of the three subtree-hash strategies the hash engine
/// maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashKind {
    /// Hash updates are skipped entirely.
    None,
    /// Incremental maintenance along the ancestor chain.
    Rolling,
    /// Full post-order recomputation on every relevant edit.
    Postorder,
}

/// Consistency mode for descendant-count/hash bookkeeping during remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// Every public op leaves every invariant holding immediately.
    Strict,
    /// Some descendant-count/hash updates on the remove path may be
    /// deferred to the bootstrap commit's post-order pass.
    Eventual,
}

/// The resource-scoped configuration a [`crate::txn::WriteTransaction`] is
/// opened against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub hash_kind: HashKind,
    pub consistency: Consistency,
    /// Whether text/attribute values longer than 10 bytes are deflated.
    pub compression: bool,
    /// Auto-commit-by-count threshold; `0` disables the count trigger.
    pub max_node_count: u64,
    /// Auto-commit-by-wall-clock interval; `None` disables the timer.
    pub auto_commit_interval: Option<Duration>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig {
            hash_kind: HashKind::Rolling,
            consistency: Consistency::Strict,
            compression: false,
            max_node_count: 0,
            auto_commit_interval: None,
        }
    }
}

impl ResourceConfig {
    /// Validate the configuration, returning the `Usage` variant for
    /// "negative config".
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(interval) = self.auto_commit_interval {
            if interval.is_zero() {
                return Err(crate::error::Error::Usage(
                    "auto_commit_interval must be positive when set",
                ));
            }
        }
        Ok(())
    }
}

/// Loads a [`ResourceConfig`] from layered environment variables, the way a
/// host session builds its configuration. Feature-gated so embedders who
/// only ever construct configuration in code do not pull in `figment`.
#[cfg(feature = "figment_config")]
pub fn load_from_env(prefix: &str) -> crate::error::Result<ResourceConfig> {
    use figment::{
        providers::{Env, Serialized},
        Figment,
    };

    Figment::from(Serialized::defaults(ResourceConfig::default()))
        .merge(Env::prefixed(prefix))
        .extract()
        .map_err(|_| crate::error::Error::Usage("invalid resource configuration from environment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = ResourceConfig::default();
        cfg.auto_commit_interval = Some(Duration::from_secs(0));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_is_valid() {
        assert!(ResourceConfig::default().validate().is_ok());
    }
}
