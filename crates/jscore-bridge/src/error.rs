//! Error types for jscore-bridge
//!
//! Script exceptions are not errors here: they come back inside
//! [`Completion`](crate::Completion) and [`ReturnObject`](crate::ReturnObject).
//! These errors cover failures of the bridge itself.

use jscore_dispatch::DispatchError;
use thiserror::Error;

/// Errors that can occur while routing an operation to the engine
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The operation could not be dispatched to its worker
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A host-side handle is unknown or stale
    #[error("Invalid handle: {0:#x}")]
    InvalidHandle(u64),

    /// The engine failed to produce a context
    #[error("Context creation failed: {0}")]
    ContextCreation(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl BridgeError {
    /// Create a context creation error
    pub fn context_creation(message: impl Into<String>) -> Self {
        Self::ContextCreation(message.into())
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
