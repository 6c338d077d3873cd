//! Address ranges

use serde::{Deserialize, Serialize};

use ddi_shared_types::RangeRecord;

use crate::address::Ipv4Address;
use crate::backend::UsedAddressQuery;
use crate::cidr::CidrBlock;
use crate::error::{RangeError, RangeResult};

/// Contiguous block `[start, end]` inside a CIDR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub cidr: CidrBlock,
    pub start: Ipv4Address,
    pub end: Ipv4Address,
}

impl AddressRange {
    /// Build a range from explicit bounds and validate it
    pub fn new(cidr: CidrBlock, start: Ipv4Address, end: Ipv4Address) -> RangeResult<Self> {
        let range = Self { cidr, start, end };
        range.validate()?;
        Ok(range)
    }

    /// Build `count` addresses starting at `start`
    pub fn from_count(cidr: CidrBlock, start: Ipv4Address, count: u64) -> RangeResult<Self> {
        if count == 0 {
            return Err(RangeError::InvalidCount { count });
        }
        cidr.check_contains(start)?;
        let end = start.add_within(count - 1, &cidr)?;
        Self::new(cidr, start, end)
    }

    /// Rebuild a range from an appliance record
    pub fn from_record(record: &RangeRecord) -> RangeResult<Self> {
        let cidr = record.network.parse()?;
        Self::new(cidr, record.start_addr.into(), record.end_addr.into())
    }

    pub fn validate(&self) -> RangeResult<()> {
        if self.start > self.end {
            return Err(RangeError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        self.cidr.check_contains(self.start)?;
        self.cidr.check_contains(self.end)?;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        u64::try_from(self.start.difference(self.end) + 1).unwrap_or(0)
    }

    pub fn contains(&self, address: Ipv4Address) -> bool {
        self.start <= address && address <= self.end
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn as_query(&self) -> UsedAddressQuery {
        UsedAddressQuery::window(self.cidr, self.start, self.end)
    }
}

/// First run of `count` free addresses between the CIDR's usable bounds,
/// scanning in ascending order.
pub fn first_free_block<F>(cidr: &CidrBlock, count: u64, mut is_free: F) -> Option<AddressRange>
where
    F: FnMut(Ipv4Address) -> bool,
{
    if count == 0 {
        return None;
    }

    let first = cidr.first_usable().value();
    let last = cidr.last_usable().value();
    let mut run_start = first;
    let mut run_len = 0u64;

    for value in first..=last {
        if is_free(Ipv4Address::new(value)) {
            if run_len == 0 {
                run_start = value;
            }
            run_len += 1;
            if run_len == count {
                return Some(AddressRange {
                    cidr: *cidr,
                    start: Ipv4Address::new(run_start),
                    end: Ipv4Address::new(value),
                });
            }
        } else {
            run_len = 0;
        }
    }

    None
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{} ({})", self.start, self.end, self.cidr)
    }
}
