//! ULL error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading or verifying a library
#[derive(Debug, Error)]
pub enum UllError {
    #[error("Library load failed: {0}")]
    Load(String),

    #[error("Interface conformance failure: {0}")]
    Conformance(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC protocol error: {0}")]
    Protocol(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Marker scan failed: {0}")]
    MarkerScan(String),

    #[error("Contract file not found: {0}")]
    ContractNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UllError {
    /// Check if this error came from a subprocess timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, UllError::Timeout(_))
    }
}
