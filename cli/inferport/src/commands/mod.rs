//! CLI command implementations.

pub mod backends;
pub mod build;
pub mod extensions;
pub mod targets;
