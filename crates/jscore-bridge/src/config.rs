//! Configuration for the bridge.
//!
//! Pool sizes and thread naming. Nothing is read from the environment; the
//! host passes a [`BridgeConfig`] (or its JSON form) when creating the bridge.

use jscore_dispatch::MAX_POOL_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::BridgeResult;

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Workers dedicated to each context.
    /// Default: 1 (strict single-thread affinity)
    pub context_pool_size: usize,

    /// Workers in the pool shared by context-independent operations
    /// (strings, groups, property name arrays).
    /// Default: 2
    pub shared_pool_size: usize,

    /// Prefix for worker thread names.
    /// Default: "jscore"
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            context_pool_size: 1,
            shared_pool_size: 2,
            thread_name: "jscore".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Set the per-context pool size (clamped to 1..=16).
    pub fn context_pool_size(mut self, size: usize) -> Self {
        self.context_pool_size = size;
        self.normalized()
    }

    /// Set the shared pool size (clamped to 1..=16).
    pub fn shared_pool_size(mut self, size: usize) -> Self {
        self.shared_pool_size = size;
        self.normalized()
    }

    /// Set the worker thread name prefix (NUL bytes are dropped).
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.context_pool_size = self.context_pool_size.clamp(1, MAX_POOL_SIZE);
        self.shared_pool_size = self.shared_pool_size.clamp(1, MAX_POOL_SIZE);
        // OS thread names cannot carry interior NULs
        self.thread_name.retain(|c| c != '\0');
        if self.thread_name.is_empty() {
            self.thread_name = Self::default().thread_name;
        }
        self
    }
}
