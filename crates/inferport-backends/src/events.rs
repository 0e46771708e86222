//! Structured events backends emit through `tracing`.
//!
//! The field names are shared with the worker log relay, which turns them
//! into file-generation records on the wire and back into the same fields
//! on the host.

use std::path::Path;

/// Field carrying the outcome of a file-generation event.
pub const FILE_STATUS_FIELD: &str = "file_status";
/// Field carrying the generated file's path.
pub const FILE_PATH_FIELD: &str = "file_path";

/// Report that a backend wrote `path`.
pub fn file_created(path: &Path) {
    tracing::info!(
        file_status = "created",
        file_path = %path.display(),
        "created {}",
        path.display()
    );
}
