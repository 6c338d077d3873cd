//! DDI collaborator abstractions

use async_trait::async_trait;

use crate::address::Ipv4Address;
use crate::cidr::CidrBlock;
use crate::error::{RangeError, RangeResult};
use crate::range::AddressRange;

pub use ddi_shared_types::{BackendType, Conflict, ConflictKind, RangeRecord, RangeSpec};

/// Window handed to the overlap oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedAddressQuery {
    pub cidr: CidrBlock,
    pub start: Ipv4Address,
    pub end: Ipv4Address,
    pub count: u64,
}

impl UsedAddressQuery {
    /// `start` must not be greater than `end`.
    pub fn window(cidr: CidrBlock, start: Ipv4Address, end: Ipv4Address) -> Self {
        let count = u64::try_from(start.difference(end) + 1).unwrap_or(0);
        Self {
            cidr,
            start,
            end,
            count,
        }
    }
}

/// Request for `count` sequential unused addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockQuery {
    pub cidr: CidrBlock,
    pub count: u32,
    pub exclude: Option<AddressRange>,
}

/// Answer of the overlap oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlapReport {
    Clear,
    Conflicts(Vec<Conflict>),
    /// The backend could not tell whether the window is free
    Unavailable(String),
}

impl OverlapReport {
    /// Conflicts found in the window; an unanswerable query is an error of its own.
    pub fn into_conflicts(self, query: &UsedAddressQuery) -> RangeResult<Vec<Conflict>> {
        match self {
            OverlapReport::Clear => Ok(Vec::new()),
            OverlapReport::Conflicts(conflicts) => Ok(conflicts),
            OverlapReport::Unavailable(reason) => Err(RangeError::OverlapUnconfirmed {
                start: query.start,
                end: query.end,
                reason,
            }),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DdiBackend: Send + Sync {
    fn backend_type(&self) -> BackendType;
    fn name(&self) -> &str;
    async fn next_available_block(
        &self,
        query: &BlockQuery,
    ) -> Result<Vec<Ipv4Address>, CollaboratorError>;
    async fn find_conflicts(
        &self,
        query: &UsedAddressQuery,
    ) -> Result<OverlapReport, CollaboratorError>;
    async fn create_range(
        &self,
        range: &AddressRange,
        spec: &RangeSpec,
    ) -> Result<RangeRecord, CollaboratorError>;
    async fn update_range(
        &self,
        reference: &str,
        range: &AddressRange,
    ) -> Result<RangeRecord, CollaboratorError>;
    async fn delete_range(&self, reference: &str) -> Result<(), CollaboratorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Network {cidr} not found on DDI backend")]
    NetworkNotFound { cidr: String },

    #[error("Range record {reference} not found")]
    RecordNotFound { reference: String },

    #[error("DDI API error: {message}")]
    Api { message: String },

    #[error("Malformed DDI response: {message}")]
    Malformed { message: String },

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: std::io::Error,
    },
}
