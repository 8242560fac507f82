//! Error types for the Almanac service.

use almanac_memory::MemoryError;
use thiserror::Error;

use crate::rpc::protocol::JsonRpcError;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

impl From<ServiceError> for JsonRpcError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match &err {
            ServiceError::InvalidParams(_) => JsonRpcError::invalid_params(message),
            ServiceError::Memory(MemoryError::NotFound(_)) => JsonRpcError::invalid_params(message),
            ServiceError::Memory(e) if e.is_validation() => JsonRpcError::invalid_params(message),
            _ => JsonRpcError::internal_error(message),
        }
    }
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
