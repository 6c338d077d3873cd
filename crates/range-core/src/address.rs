//! IPv4 address arithmetic

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::cidr::CidrBlock;
use crate::error::{ArithmeticOp, RangeError, RangeResult};

/// IPv4 address as a raw 32-bit value
///
/// Ordering is numeric, so `172.19.4.9 < 172.19.4.10` holds where a
/// dotted-quad string comparison would not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Ipv4Addr", into = "Ipv4Addr")]
pub struct Ipv4Address(u32);

impl Ipv4Address {
    pub const MIN: Ipv4Address = Ipv4Address(0);
    pub const MAX: Ipv4Address = Ipv4Address(u32::MAX);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Shift up by `n`, failing instead of wrapping past 255.255.255.255
    pub fn add(self, n: u64) -> RangeResult<Self> {
        u64::from(self.0)
            .checked_add(n)
            .and_then(|v| u32::try_from(v).ok())
            .map(Self)
            .ok_or(RangeError::ArithmeticOverflow {
                address: self,
                op: ArithmeticOp::Add,
                delta: n,
            })
    }

    /// Shift down by `n`, failing instead of wrapping past 0.0.0.0
    pub fn subtract(self, n: u64) -> RangeResult<Self> {
        u64::from(self.0)
            .checked_sub(n)
            .and_then(|v| u32::try_from(v).ok())
            .map(Self)
            .ok_or(RangeError::ArithmeticOverflow {
                address: self,
                op: ArithmeticOp::Subtract,
                delta: n,
            })
    }

    pub fn add_within(self, n: u64, cidr: &CidrBlock) -> RangeResult<Self> {
        let next = self.add(n)?;
        Self::bounded(next, cidr)
    }

    pub fn subtract_within(self, n: u64, cidr: &CidrBlock) -> RangeResult<Self> {
        let next = self.subtract(n)?;
        Self::bounded(next, cidr)
    }

    pub fn increment(self) -> RangeResult<Self> {
        self.add(1)
    }

    pub fn decrement(self) -> RangeResult<Self> {
        self.subtract(1)
    }

    /// Signed distance `other - self`
    pub fn difference(self, other: Ipv4Address) -> i64 {
        i64::from(other.0) - i64::from(self.0)
    }

    pub fn to_ipv4_addr(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0)
    }

    fn bounded(address: Self, cidr: &CidrBlock) -> RangeResult<Self> {
        if cidr.contains(address) {
            Ok(address)
        } else {
            Err(RangeError::OutOfNetworkRange {
                address,
                cidr: *cidr,
            })
        }
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr))
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        Ipv4Addr::from(addr.0)
    }
}

impl From<u32> for Ipv4Address {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for Ipv4Address {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| RangeError::InvalidAddress(s.to_string()))
    }
}

impl std::fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_ipv4_addr())
    }
}
