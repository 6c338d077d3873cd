//! DDI range CLI
//!
//! Command line front end for allocating, resizing, validating and
//! releasing IPv4 address ranges on a DDI backend.

pub mod commands;
pub mod context;
pub mod output;
