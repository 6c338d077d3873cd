//! DDI Range Core
//!
//! IPv4 arithmetic, CIDR containment and contiguous range allocation
//! against a DDI appliance.

pub mod address;
pub mod allocator;
pub mod backend;
pub mod cidr;
pub mod error;
pub mod lock;
pub mod range;
pub mod resizer;


pub use address::Ipv4Address;
pub use allocator::{AllocatedRange, AllocationRequest, RangeAllocator};
pub use backend::{
    BackendType, BlockQuery, CollaboratorError, Conflict, ConflictKind, DdiBackend, OverlapReport,
    RangeRecord, RangeSpec, UsedAddressQuery,
};
pub use cidr::CidrBlock;
pub use error::{ArithmeticOp, RangeError, RangeField, RangeResult};
pub use lock::{AllocationGuard, AllocationLock};
pub use range::{first_free_block, AddressRange};
pub use resizer::{ManagedRange, RangeChange, RangeResizer, ResizeOutcome, ResizeRejection};
