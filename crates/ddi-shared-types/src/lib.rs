pub mod ddi;
pub mod error;
pub mod range;

pub use ddi::{BackendType, DdiConfig};
pub use error::{SharedResult, SharedTypeError};
pub use range::{Conflict, ConflictKind, RangeRecord, RangeSpec};
