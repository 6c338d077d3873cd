//! Sequential and explicit range allocation

use std::sync::Arc;

use crate::address::Ipv4Address;
use crate::backend::{BlockQuery, CollaboratorError, DdiBackend, RangeRecord, RangeSpec};
use crate::cidr::CidrBlock;
use crate::error::{RangeError, RangeResult};
use crate::lock::AllocationLock;
use crate::range::AddressRange;

const EXPLICIT_OVERLAP: &str = "requested range overlaps with another range or used address";

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationRequest {
    /// `count` addresses starting at the first available one
    Sequential {
        cidr: CidrBlock,
        count: u32,
        exclude: Option<AddressRange>,
    },
    Explicit {
        cidr: CidrBlock,
        start: Ipv4Address,
        end: Ipv4Address,
    },
}

impl AllocationRequest {
    pub fn sequential(cidr: CidrBlock, count: u32) -> Self {
        AllocationRequest::Sequential {
            cidr,
            count,
            exclude: None,
        }
    }

    pub fn explicit(cidr: CidrBlock, start: Ipv4Address, end: Ipv4Address) -> Self {
        AllocationRequest::Explicit { cidr, start, end }
    }

    pub fn cidr(&self) -> &CidrBlock {
        match self {
            AllocationRequest::Sequential { cidr, .. } => cidr,
            AllocationRequest::Explicit { cidr, .. } => cidr,
        }
    }
}

/// Range validated and persisted at the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedRange {
    pub range: AddressRange,
    pub record: RangeRecord,
}

/// Range allocator
///
/// Produces validated ranges for new allocations. Sequential requests are
/// serialized through the injected [`AllocationLock`].
pub struct RangeAllocator {
    backend: Arc<dyn DdiBackend>,
    lock: AllocationLock,
}

impl RangeAllocator {
    pub fn new(backend: Arc<dyn DdiBackend>, lock: AllocationLock) -> Self {
        Self { backend, lock }
    }

    pub fn lock(&self) -> &AllocationLock {
        &self.lock
    }

    /// Compute and validate a range without persisting it
    pub async fn allocate(&self, request: &AllocationRequest) -> RangeResult<AddressRange> {
        match request {
            AllocationRequest::Sequential {
                cidr,
                count,
                exclude,
            } => {
                let _guard = self.lock.acquire().await;
                self.allocate_sequential(cidr, *count, exclude.as_ref()).await
            }
            AllocationRequest::Explicit { cidr, start, end } => {
                self.allocate_explicit(cidr, *start, *end).await
            }
        }
    }

    /// Allocate and create the range record at the backend
    ///
    /// For sequential requests the lock is held until the record exists, so
    /// two creations can never be handed the same free block.
    pub async fn allocate_and_create(
        &self,
        request: &AllocationRequest,
        spec: &RangeSpec,
    ) -> RangeResult<AllocatedRange> {
        let (range, _guard) = match request {
            AllocationRequest::Sequential {
                cidr,
                count,
                exclude,
            } => {
                let guard = self.lock.acquire().await;
                let range = self
                    .allocate_sequential(cidr, *count, exclude.as_ref())
                    .await?;
                (range, Some(guard))
            }
            AllocationRequest::Explicit { cidr, start, end } => {
                (self.allocate_explicit(cidr, *start, *end).await?, None)
            }
        };

        let record = self.backend.create_range(&range, spec).await?;
        log::info!(
            "Created range {} on {} ({})",
            range,
            self.backend.name(),
            record.reference
        );

        Ok(AllocatedRange { range, record })
    }

    /// Delete a range record at the backend
    pub async fn release(&self, reference: &str) -> RangeResult<()> {
        self.backend.delete_range(reference).await?;
        log::info!("Released range {} on {}", reference, self.backend.name());
        Ok(())
    }

    async fn allocate_sequential(
        &self,
        cidr: &CidrBlock,
        count: u32,
        exclude: Option<&AddressRange>,
    ) -> RangeResult<AddressRange> {
        if count == 0 {
            return Err(RangeError::InvalidCount { count: 0 });
        }
        if u64::from(count) > cidr.size() {
            return Err(RangeError::NoFreeAddresses {
                cidr: *cidr,
                count: u64::from(count),
            });
        }

        let query = BlockQuery {
            cidr: *cidr,
            count,
            exclude: exclude.cloned(),
        };
        let addresses = self.backend.next_available_block(&query).await?;

        let (start, end) = match (addresses.first(), addresses.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(RangeError::NoFreeAddresses {
                    cidr: *cidr,
                    count: u64::from(count),
                })
            }
        };

        if addresses.len() != count as usize {
            return Err(malformed(format!(
                "asked for {} addresses in {}, got {}",
                count,
                cidr,
                addresses.len()
            )));
        }
        if let Some(pair) = addresses
            .windows(2)
            .find(|pair| pair[0].difference(pair[1]) != 1)
        {
            return Err(malformed(format!(
                "addresses {} and {} are not sequential",
                pair[0], pair[1]
            )));
        }

        let range = AddressRange::new(*cidr, start, end)?;
        if let Some(excluded) = exclude {
            if range.overlaps(excluded) {
                return Err(malformed(format!(
                    "block {} intersects excluded window {}",
                    range, excluded
                )));
            }
        }

        log::info!(
            "Allocated sequential range {} ({} addresses) from {}",
            range,
            count,
            self.backend.name()
        );
        Ok(range)
    }

    async fn allocate_explicit(
        &self,
        cidr: &CidrBlock,
        start: Ipv4Address,
        end: Ipv4Address,
    ) -> RangeResult<AddressRange> {
        let range = AddressRange::new(*cidr, start, end)?;

        let query = range.as_query();
        log::debug!("Checking {} for conflicts", range);
        let conflicts = self
            .backend
            .find_conflicts(&query)
            .await?
            .into_conflicts(&query)?;

        if !conflicts.is_empty() {
            log::warn!(
                "Rejected range {}: {} conflicting object(s)",
                range,
                conflicts.len()
            );
            return Err(RangeError::RangeOverlap {
                message: EXPLICIT_OVERLAP.to_string(),
                start,
                end,
                conflicts,
            });
        }

        log::info!("Allocated range {}", range);
        Ok(range)
    }
}

fn malformed(message: String) -> RangeError {
    CollaboratorError::Malformed { message }.into()
}
