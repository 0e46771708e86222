//! TOML parsing, serialization, validation, and discovery for chip records.
//!
//! Chip records are stored as `.soc.toml` files. A directory of them can be
//! merged into a [`Catalog`] on top of the built-in chips.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, ChipRecord};
use crate::error::{Result, TargetError};

/// File suffix of chip record files.
pub const CHIP_FILE_SUFFIX: &str = ".soc.toml";

/// A validation issue found in a chip record.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Load a chip record from a `.soc.toml` file.
pub fn load_chip_toml(path: &Path) -> Result<ChipRecord> {
    if !path.exists() {
        return Err(TargetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_chip_toml(&content)
}

/// Parse a chip record from a TOML string.
pub fn parse_chip_toml(toml_str: &str) -> Result<ChipRecord> {
    let chip: ChipRecord = toml::from_str(toml_str)?;
    Ok(chip.normalized())
}

/// Serialize a chip record to pretty TOML.
pub fn chip_to_toml(chip: &ChipRecord) -> Result<String> {
    let toml_str = toml::to_string_pretty(chip)?;
    Ok(toml_str)
}

/// Validate a chip record for structural correctness.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with a list of problems.
pub fn validate_chip(chip: &ChipRecord) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. Chip has a name
    if chip.name.trim().is_empty() {
        issues.push(ValidationIssue {
            severity: "error",
            message: "chip has an empty name".into(),
        });
    }

    // 2. Core ids are unique
    let mut seen = BTreeSet::new();
    for core in &chip.cores {
        if !seen.insert(core.id.as_str()) {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!("core '{}' is listed more than once", core.id),
            });
        }
    }

    // 3. Every core has a family (resolution reports it as a data fault otherwise)
    for core in &chip.cores {
        if core.family.as_deref().map_or(true, |f| f.trim().is_empty()) {
            issues.push(ValidationIssue {
                severity: "warning",
                message: format!("core '{}' has no family and cannot be targeted", core.id),
            });
        }
    }

    // 4. Accelerators have at least one owner, and every owner is a core on the chip
    for accel in &chip.accelerators {
        if accel.owners.is_empty() {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!("accelerator '{}' has no owning cores", accel.name),
            });
        }
        for owner in &accel.owners {
            if chip.core(owner).is_none() {
                issues.push(ValidationIssue {
                    severity: "error",
                    message: format!(
                        "accelerator '{}' names owner '{}' which is not a core on '{}'",
                        accel.name, owner, chip.name
                    ),
                });
            }
        }
    }

    // 5. Packages are unique
    let mut packages = BTreeSet::new();
    for package in &chip.packages {
        if !packages.insert(package.as_str()) {
            issues.push(ValidationIssue {
                severity: "warning",
                message: format!("package '{package}' is listed more than once"),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Discover all `.soc.toml` files directly inside `dir`.
///
/// Returns a list of (chip_file_stem, file_path) pairs sorted by name.
pub fn discover_chip_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(CHIP_FILE_SUFFIX))
        {
            files.push((name.to_string(), path.clone()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Load a single file or every chip file in a directory into `catalog`.
///
/// Records with validation errors are rejected; warnings are tolerated.
pub fn extend_catalog(catalog: &mut Catalog, path: &Path) -> Result<usize> {
    let files = if path.is_dir() {
        discover_chip_files(path)?.into_iter().map(|(_, p)| p).collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut added = 0;
    for file in files {
        let chip = load_chip_toml(&file)?;
        if let Err(issues) = validate_chip(&chip) {
            let errors: Vec<String> = issues
                .into_iter()
                .filter(|i| i.severity == "error")
                .map(|i| i.message)
                .collect();
            if !errors.is_empty() {
                return Err(TargetError::Validation {
                    detail: format!("{}: {}", file.display(), errors.join("; ")),
                });
            }
        }
        catalog.insert(chip)?;
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX78000_TOML: &str = r#"
name = "max78000"
packages = ["ctbga"]

[[cores]]
id = "cm4"
family = "cortex-m4"

[[cores]]
id = "rv"
family = "risc-v"

[[accelerators]]
name = "cnn"
owners = ["cm4", "rv"]
"#;

    #[test]
    fn parse_normalizes_names() {
        let chip = parse_chip_toml(MAX78000_TOML).unwrap();
        assert_eq!(chip.name, "MAX78000");
        assert_eq!(chip.packages, vec!["CTBGA"]);
        assert_eq!(chip.cores[1].family.as_deref(), Some("RISC-V"));
        assert_eq!(chip.accelerators[0].owners, vec!["CM4", "RV"]);
        assert!(validate_chip(&chip).is_ok());
    }

    #[test]
    fn serialized_record_parses_back() {
        let chip = parse_chip_toml(MAX78000_TOML).unwrap();
        let text = chip_to_toml(&chip).unwrap();
        assert_eq!(parse_chip_toml(&text).unwrap(), chip);
    }

    #[test]
    fn parse_invalid_returns_error() {
        assert!(parse_chip_toml("this is not valid toml [[[").is_err());
    }

    #[test]
    fn validate_unknown_owner() {
        let mut chip = parse_chip_toml(MAX78000_TOML).unwrap();
        chip.accelerators[0].owners.push("CM33".into());
        let issues = validate_chip(&chip).unwrap_err();
        assert!(issues
            .iter()
            .any(|i| i.severity == "error" && i.message.contains("CM33")));
    }

    #[test]
    fn validate_missing_family_is_warning() {
        let mut chip = parse_chip_toml(MAX78000_TOML).unwrap();
        chip.cores[0].family = None;
        let issues = validate_chip(&chip).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, "warning");
    }

    #[test]
    fn validate_duplicate_core() {
        let mut chip = parse_chip_toml(MAX78000_TOML).unwrap();
        chip.cores.push(chip.cores[0].clone());
        let issues = validate_chip(&chip).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("more than once")));
    }

    #[test]
    fn discover_finds_chip_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.soc.toml"), MAX78000_TOML).unwrap();
        std::fs::write(dir.path().join("a.soc.toml"), MAX78000_TOML).unwrap();
        // Non-.soc.toml file should be ignored
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let files = discover_chip_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "a");
        assert_eq!(files[1].0, "b");
    }

    #[test]
    fn discover_missing_dir_is_empty() {
        let files = discover_chip_files(Path::new("/nonexistent/catalog")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn load_not_found() {
        let result = load_chip_toml(Path::new("/nonexistent/path.soc.toml"));
        assert!(matches!(result.unwrap_err(), TargetError::NotFound { .. }));
    }

    #[test]
    fn extend_rejects_duplicates_of_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("max78000.soc.toml"), MAX78000_TOML).unwrap();
        let mut catalog = Catalog::builtin();
        let err = extend_catalog(&mut catalog, dir.path()).unwrap_err();
        assert!(matches!(err, TargetError::DuplicateChip { .. }));
    }

    #[test]
    fn extend_adds_new_chip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.soc.toml");
        std::fs::write(&path, MAX78000_TOML.replace("max78000", "max78099")).unwrap();
        let mut catalog = Catalog::builtin();
        let added = extend_catalog(&mut catalog, &path).unwrap();
        assert_eq!(added, 1);
        assert!(catalog.chip("MAX78099").is_some());
    }

    #[test]
    fn extend_rejects_invalid_record() {
        let dir = tempfile::tempdir().unwrap();
        let bad = MAX78000_TOML
            .replace("max78000", "max78099")
            .replace(r#"owners = ["cm4", "rv"]"#, r#"owners = ["dsp"]"#);
        std::fs::write(dir.path().join("bad.soc.toml"), bad).unwrap();
        let mut catalog = Catalog::new();
        let err = extend_catalog(&mut catalog, dir.path()).unwrap_err();
        assert!(matches!(err, TargetError::Validation { .. }));
        assert!(catalog.is_empty());
    }
}
