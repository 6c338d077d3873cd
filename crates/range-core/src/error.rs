//! Error types for range operations

use thiserror::Error;

use ddi_shared_types::Conflict;

use crate::address::Ipv4Address;
use crate::backend::CollaboratorError;
use crate::cidr::CidrBlock;

/// Result type for range operations
pub type RangeResult<T> = std::result::Result<T, RangeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
}

impl std::fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "+"),
            ArithmeticOp::Subtract => write!(f, "-"),
        }
    }
}

/// Range attribute touched by a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeField {
    Count,
    Start,
    End,
}

impl RangeField {
    fn shift_rejected(&self) -> &'static str {
        match self {
            RangeField::Start => "decreasing start_address overlaps with another range or used IP",
            RangeField::End => "increasing end_address overlaps with another range or used IP",
            RangeField::Count => "count increase overlaps with another range or used address",
        }
    }
}

impl std::fmt::Display for RangeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeField::Count => write!(f, "count"),
            RangeField::Start => write!(f, "start_address"),
            RangeField::End => write!(f, "end_address"),
        }
    }
}

fn describe(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for range operations
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("Address arithmetic overflow: {address} {op} {delta} leaves the IPv4 address space")]
    ArithmeticOverflow {
        address: Ipv4Address,
        op: ArithmeticOp,
        delta: u64,
    },

    #[error("Address {address} is out of network range {cidr}")]
    OutOfNetworkRange {
        address: Ipv4Address,
        cidr: CidrBlock,
    },

    #[error("Address {address} is outside CIDR {cidr}")]
    OutsideCidr {
        address: Ipv4Address,
        cidr: CidrBlock,
    },

    #[error("Invalid range: start address {start} is greater than end address {end}")]
    InvalidRange {
        start: Ipv4Address,
        end: Ipv4Address,
    },

    #[error("Invalid count {count}: a range holds at least one address")]
    InvalidCount { count: u64 },

    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("No {count} sequential free addresses available in {cidr}")]
    NoFreeAddresses { cidr: CidrBlock, count: u64 },

    #[error("{message} ({start}-{end}): {}", describe(.conflicts))]
    RangeOverlap {
        message: String,
        start: Ipv4Address,
        end: Ipv4Address,
        conflicts: Vec<Conflict>,
    },

    #[error("{} ({start}-{end}): {}", .field.shift_rejected(), describe(.conflicts))]
    BoundaryShiftRejected {
        field: RangeField,
        start: Ipv4Address,
        end: Ipv4Address,
        conflicts: Vec<Conflict>,
    },

    #[error("Could not confirm {start}-{end} is free: {reason}")]
    OverlapUnconfirmed {
        start: Ipv4Address,
        end: Ipv4Address,
        reason: String,
    },

    #[error("Conflicting change: {0}")]
    ConflictingChange(String),

    #[error("DDI collaborator error: {0}")]
    CollaboratorError(#[from] CollaboratorError),
}

impl RangeError {
    pub(crate) fn count_overlap(
        start: Ipv4Address,
        end: Ipv4Address,
        conflicts: Vec<Conflict>,
    ) -> Self {
        RangeError::RangeOverlap {
            message: RangeField::Count.shift_rejected().to_string(),
            start,
            end,
            conflicts,
        }
    }

    /// Whether the error came from the DDI appliance rather than local validation
    pub fn is_collaborator(&self) -> bool {
        matches!(self, RangeError::CollaboratorError(_))
    }
}
