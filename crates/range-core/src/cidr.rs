//! IPv4 CIDR blocks

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::address::Ipv4Address;
use crate::error::{RangeError, RangeResult};

/// Closed address space `[network, broadcast]`
///
/// Always stored truncated to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Ipv4Net", into = "Ipv4Net")]
pub struct CidrBlock(Ipv4Net);

impl CidrBlock {
    pub fn new(address: Ipv4Address, prefix_len: u8) -> RangeResult<Self> {
        Ipv4Net::new(address.to_ipv4_addr(), prefix_len)
            .map(Self::from)
            .map_err(|_| RangeError::InvalidCidr(format!("{}/{}", address, prefix_len)))
    }

    pub fn network(&self) -> Ipv4Address {
        self.0.network().into()
    }

    pub fn broadcast(&self) -> Ipv4Address {
        self.0.broadcast().into()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of addresses in the block, network and broadcast included
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len()))
    }

    pub fn contains(&self, address: Ipv4Address) -> bool {
        self.network() <= address && address <= self.broadcast()
    }

    pub fn check_contains(&self, address: Ipv4Address) -> RangeResult<()> {
        if self.contains(address) {
            Ok(())
        } else {
            Err(RangeError::OutsideCidr {
                address,
                cidr: *self,
            })
        }
    }

    /// First address handed out by "next available" searches
    pub fn first_usable(&self) -> Ipv4Address {
        if self.prefix_len() >= 31 {
            self.network()
        } else {
            Ipv4Address::new(self.network().value() + 1)
        }
    }

    pub fn last_usable(&self) -> Ipv4Address {
        if self.prefix_len() >= 31 {
            self.broadcast()
        } else {
            Ipv4Address::new(self.broadcast().value() - 1)
        }
    }
}

impl From<Ipv4Net> for CidrBlock {
    fn from(net: Ipv4Net) -> Self {
        Self(net.trunc())
    }
}

impl From<CidrBlock> for Ipv4Net {
    fn from(cidr: CidrBlock) -> Self {
        cidr.0
    }
}

impl std::str::FromStr for CidrBlock {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Net>()
            .map(Self::from)
            .map_err(|_| RangeError::InvalidCidr(s.to_string()))
    }
}

impl std::fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
