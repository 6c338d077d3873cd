//! CLI commands

pub mod allocate;
pub mod release;
pub mod resize;
pub mod validate;

pub use allocate::{AllocateArgs, AllocateCommand};
pub use release::ReleaseCommand;
pub use resize::{ResizeArgs, ResizeCommand};
pub use validate::ValidateCommand;
