use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Kind of object found inside a queried address window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Range,
    FixedAddress,
    Reservation,
    Lease,
    Other(String),
}

impl ConflictKind {
    /// Map a WAPI `ipv4address.types` entry onto a conflict kind.
    pub fn from_wapi_type(value: &str) -> Self {
        match value {
            "DHCP_RANGE" | "RANGE" => ConflictKind::Range,
            "FA" | "FIXED_ADDRESS" => ConflictKind::FixedAddress,
            "RESERVATION" | "RESERVED_RANGE" => ConflictKind::Reservation,
            "LEASE" => ConflictKind::Lease,
            other => ConflictKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Range => write!(f, "range"),
            ConflictKind::FixedAddress => write!(f, "fixed address"),
            ConflictKind::Reservation => write!(f, "reservation"),
            ConflictKind::Lease => write!(f, "lease"),
            ConflictKind::Other(kind) => write!(f, "{}", kind.to_lowercase()),
        }
    }
}

/// An object occupying part of a queried window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub kind: ConflictKind,
    pub reference: Option<String>,
}

impl Conflict {
    pub fn address(ip: Ipv4Addr, kind: ConflictKind) -> Self {
        Self {
            start: ip,
            end: ip,
            kind,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{} {}", self.kind, self.start)
        } else {
            write!(f, "{} {}-{}", self.kind, self.start, self.end)
        }
    }
}

/// Caller-owned attributes of a range record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeSpec {
    pub name: Option<String>,
    pub comment: Option<String>,
    pub network_view: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// A range as persisted by the DDI appliance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeRecord {
    #[serde(rename = "_ref")]
    pub reference: String,
    pub network: String,
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
    #[serde(default)]
    pub network_view: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}
