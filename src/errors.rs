use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures the engine reports to its caller.
///
/// Missing ids and rejected transitions are not errors: those operations are
/// no-ops that return `None`/`false`. Only durable-write and external
/// resource failures surface here.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("External resource error: {message}")]
    ExternalResourceError { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl EngineError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalResourceError {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        Self::InternalError {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError {
            message: error.to_string(),
        }
    }
}

impl From<EngineError> for String {
    fn from(error: EngineError) -> Self {
        error.to_string()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
