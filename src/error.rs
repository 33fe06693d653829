//! Error types for the finance manager core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for finance operations
pub type Result<T> = std::result::Result<T, FinanceError>;

#[derive(Error, Debug)]
pub enum FinanceError {

    // =============================
    // Core Taxonomy
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store call timed out after {0} ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three failure classes callers can act on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    StorageError,
}

impl FinanceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        FinanceError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        FinanceError::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        FinanceError::Storage(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FinanceError::InvalidInput(_) => ErrorCode::InvalidInput,
            FinanceError::NotFound(_) => ErrorCode::NotFound,
            // Caller input is decoded into InvalidInput at the boundary
            FinanceError::Serialization(_)
            | FinanceError::Storage(_)
            | FinanceError::Timeout(_)
            | FinanceError::Config(_)
            | FinanceError::Database(_)
            | FinanceError::Io(_) => ErrorCode::StorageError,
        }
    }

    /// Bare detail string without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            FinanceError::InvalidInput(msg)
            | FinanceError::NotFound(msg)
            | FinanceError::Storage(msg)
            | FinanceError::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotFound => "not_found",
            ErrorCode::StorageError => "storage_error",
        };
        write!(f, "{}", s)
    }
}
