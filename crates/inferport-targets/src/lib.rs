//! Hardware capability catalog and deployment target resolution.
//!
//! A deployment target names a chip (SoC), one of its cores and optionally an
//! accelerator peripheral the core drives. This crate provides:
//! - **Catalog:** which chips, packages, cores and accelerators exist
//! - **Hardware descriptors:** the explicit/generic shapes backends advertise
//! - **Resolution:** validation of a request into an immutable [`ResolvedTarget`]
//! - **Catalog files:** `.soc.toml` loading, validation and discovery

pub mod catalog;
pub mod error;
pub mod hardware;
pub mod parse;
pub mod resolve;
pub mod user_target;

pub use catalog::{AcceleratorRecord, Catalog, ChipRecord, CoreRecord};
pub use error::{bulleted_alternatives, Result, TargetError};
pub use hardware::{BackendTarget, HardwareSpec};
pub use resolve::{ResolvedTarget, TargetRequest};
pub use user_target::UserTarget;

/// Canonical spelling of a hardware or software name.
///
/// Catalog entries, backend targets and user requests are all compared in
/// this form, so `max78002.cm4` and `MAX78002.CM4` name the same target.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// [`canonical_name`] lifted over an optional value.
pub fn canonical_opt(name: Option<&str>) -> Option<String> {
    name.map(canonical_name)
}
