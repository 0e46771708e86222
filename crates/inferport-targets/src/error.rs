//! Error types for catalog and resolution operations.

use std::path::PathBuf;

/// Errors that can occur while loading the catalog or resolving a target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The chip is unknown or has no AI-capable cores.
    #[error("SoC {soc} could not be found{}", bulleted_alternatives(.supported))]
    UnsupportedSoc {
        /// Requested chip, with its package in brackets when one was given.
        soc: String,
        /// Chips (or chip/package pairs) that are available.
        supported: Vec<String>,
    },

    /// The core does not exist on the chip.
    #[error("Core {core} was not found on SoC {soc}{}", bulleted_alternatives(.supported))]
    UnsupportedCore {
        soc: String,
        core: String,
        supported: Vec<String>,
    },

    /// The capability data itself is inconsistent.
    #[error("configuration error: {detail}")]
    Configuration {
        /// Description of the inconsistency.
        detail: String,
    },

    /// The accelerator does not exist on the chip.
    #[error("Accelerator {accelerator} not found on SoC {soc}{}", bulleted_alternatives(.supported))]
    UnsupportedAccelerator {
        soc: String,
        accelerator: String,
        supported: Vec<String>,
    },

    /// The core exists but cannot drive the accelerator.
    #[error("Core {core} cannot manage accelerator {accelerator} on SoC {soc}{}", bulleted_alternatives(.owners))]
    Ownership {
        soc: String,
        core: String,
        accelerator: String,
        /// Cores that are able to own the accelerator.
        owners: Vec<String>,
    },

    /// A `soc[package].core.accelerator` string could not be parsed.
    #[error("invalid target '{input}': {reason}")]
    InvalidUserTarget {
        input: String,
        reason: String,
    },

    /// Two catalog entries describe the same chip.
    #[error("chip '{name}' is already present in the catalog")]
    DuplicateChip {
        name: String,
    },

    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// I/O error reading catalog files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog file not found.
    #[error("catalog file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Validation error in a chip definition.
    #[error("validation error: {detail}")]
    Validation {
        /// Description of the validation failure.
        detail: String,
    },
}

impl TargetError {
    /// Valid alternatives carried by a resolution failure, sorted.
    pub fn alternatives(&self) -> Vec<String> {
        let items = match self {
            TargetError::UnsupportedSoc { supported, .. }
            | TargetError::UnsupportedCore { supported, .. }
            | TargetError::UnsupportedAccelerator { supported, .. } => supported.clone(),
            TargetError::Ownership { owners, .. } => owners.clone(),
            _ => Vec::new(),
        };
        sorted(items)
    }

    /// Whether this error is caused by the user's request rather than by
    /// broken capability data or I/O.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            TargetError::UnsupportedSoc { .. }
                | TargetError::UnsupportedCore { .. }
                | TargetError::UnsupportedAccelerator { .. }
                | TargetError::Ownership { .. }
                | TargetError::InvalidUserTarget { .. }
        )
    }
}

/// Render a list of valid alternatives as a sorted bullet list suffix.
///
/// Returns an empty string for an empty list so messages stay single-line.
pub fn bulleted_alternatives(items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nBut the following are supported");
    for item in sorted(items.to_vec()) {
        out.push_str("\n  - ");
        out.push_str(&item);
    }
    out
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items
}

/// Result type for catalog and resolution operations.
pub type Result<T> = std::result::Result<T, TargetError>;
