//! DDI Drivers
//!
//! Range backend implementations

pub mod factory;
pub mod infoblox;
pub mod memory;


pub use factory::DdiBackendFactory;
pub use infoblox::InfobloxClient;
pub use memory::MemoryDdi;
