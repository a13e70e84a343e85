//! Error types for the object pools

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error returned by [`ObjectFactory`](crate::ObjectFactory) callbacks.
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Failed to create pooled object: {0}")]
    Creation(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("Pool is exhausted - no object available and none may be created")]
    PoolExhausted,

    #[error("Timed out after {0:?} waiting for an object")]
    Timeout(Duration),

    #[error("Pool is closed")]
    Closed,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl PoolError {
    pub(crate) fn creation(err: FactoryError) -> Self {
        PoolError::Creation(Arc::from(err))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PoolError::InvalidConfiguration(msg.into())
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
