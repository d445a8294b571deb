//! Error types for the state store.

use crate::types::{Hook, StoreId};
use thiserror::Error;

/// Error returned by a middleware hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store not registered: {0}")]
    UnknownStore(StoreId),

    #[error("Key {key:?} is not part of store {store}")]
    UnknownKey { store: StoreId, key: String },

    #[error("Could not resolve caller: {0}")]
    CallerResolution(String),

    #[error("Middleware {index} failed in {hook}: {source}")]
    Middleware {
        hook: Hook,
        index: usize,
        #[source]
        source: HookError,
    },

    #[error("Middleware already registered for store {0}")]
    MiddlewareAlreadyRegistered(StoreId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
