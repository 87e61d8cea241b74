use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FetchError {
    #[error("catalog request failed: {0}")]
    Network(String),
    #[error("catalog is misconfigured: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PurchaseError {
    #[error("purchase cancelled by user")]
    Cancelled,
    #[error("purchase declined: {0}")]
    Declined(String),
    #[error("purchase failed: {0}")]
    Failed(String),
    #[error("unknown product {0}")]
    UnknownProduct(String),
}

impl PurchaseError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PurchaseError::Cancelled)
    }
}

/// Restore failed at the platform level. A restore that finds nothing is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RestoreError {
    #[error("restore failed: {0}")]
    Platform(String),
}
