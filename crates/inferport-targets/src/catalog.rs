//! Capability catalog: which chips exist and what they can run inference on.
//!
//! The catalog is built once at startup (built-in records plus any
//! `.soc.toml` files) and then only read, so it can be shared freely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical_name;
use crate::error::{Result, TargetError};

/// A core able to host inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoreRecord {
    /// Core identifier on the chip (e.g., "CM4", "RV").
    pub id: String,
    /// Architecture family used for generic matching (e.g., "CORTEX-M4").
    ///
    /// Optional in the file format so that a missing value can be reported
    /// as a data fault at resolution time instead of failing the whole load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// An AI accelerator peripheral and the cores that may drive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AcceleratorRecord {
    pub name: String,
    pub owners: Vec<String>,
}

/// Capability record for one chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChipRecord {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub cores: Vec<CoreRecord>,
    #[serde(default)]
    pub accelerators: Vec<AcceleratorRecord>,
}

impl ChipRecord {
    /// A chip is AI-capable when at least one of its cores can host inference.
    pub fn is_ai_capable(&self) -> bool {
        !self.cores.is_empty()
    }

    pub fn core(&self, id: &str) -> Option<&CoreRecord> {
        let id = canonical_name(id);
        self.cores.iter().find(|c| c.id == id)
    }

    pub fn accelerator(&self, name: &str) -> Option<&AcceleratorRecord> {
        let name = canonical_name(name);
        self.accelerators.iter().find(|a| a.name == name)
    }

    pub fn has_package(&self, package: &str) -> bool {
        let package = canonical_name(package);
        self.packages.iter().any(|p| *p == package)
    }

    /// Sorted core identifiers.
    pub fn supported_cores(&self) -> Vec<String> {
        let mut cores: Vec<String> = self.cores.iter().map(|c| c.id.clone()).collect();
        cores.sort();
        cores
    }

    /// Sorted accelerator names.
    pub fn supported_accelerators(&self) -> Vec<String> {
        let mut accels: Vec<String> = self.accelerators.iter().map(|a| a.name.clone()).collect();
        accels.sort();
        accels
    }

    /// Copy of this record with every name in canonical spelling.
    pub fn normalized(&self) -> Self {
        Self {
            name: canonical_name(&self.name),
            packages: self.packages.iter().map(|p| canonical_name(p)).collect(),
            cores: self
                .cores
                .iter()
                .map(|c| CoreRecord {
                    id: canonical_name(&c.id),
                    family: c
                        .family
                        .as_deref()
                        .map(canonical_name)
                        .filter(|f| !f.is_empty()),
                })
                .collect(),
            accelerators: self
                .accelerators
                .iter()
                .map(|a| AcceleratorRecord {
                    name: canonical_name(&a.name),
                    owners: a.owners.iter().map(|o| canonical_name(o)).collect(),
                })
                .collect(),
        }
    }
}

/// The set of known chips, keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    chips: BTreeMap<String, ChipRecord>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The chips shipped with inferport.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for chip in builtin_chips() {
            // Names below are unique, so insertion cannot collide.
            let _ = catalog.insert(chip);
        }
        catalog
    }

    /// Add a chip. Fails if a chip with the same name is already present.
    pub fn insert(&mut self, chip: ChipRecord) -> Result<()> {
        let chip = chip.normalized();
        if self.chips.contains_key(&chip.name) {
            return Err(TargetError::DuplicateChip { name: chip.name });
        }
        self.chips.insert(chip.name.clone(), chip);
        Ok(())
    }

    /// Add several chips, stopping at the first duplicate.
    pub fn extend(&mut self, chips: impl IntoIterator<Item = ChipRecord>) -> Result<()> {
        for chip in chips {
            self.insert(chip)?;
        }
        Ok(())
    }

    pub fn chip(&self, name: &str) -> Option<&ChipRecord> {
        self.chips.get(&canonical_name(name))
    }

    /// All chips in name order.
    pub fn chips(&self) -> impl Iterator<Item = &ChipRecord> {
        self.chips.values()
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Sorted names of AI-capable chips.
    pub fn supported_socs(&self) -> Vec<String> {
        self.chips
            .values()
            .filter(|c| c.is_ai_capable())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Sorted `SOC[PACKAGE]` pairs of AI-capable chips.
    pub fn supported_soc_packages(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .chips
            .values()
            .filter(|c| c.is_ai_capable())
            .flat_map(|c| c.packages.iter().map(move |p| format!("{}[{}]", c.name, p)))
            .collect();
        pairs.sort();
        pairs
    }

    /// Every `CORE` and `CORE.ACCELERATOR` a user may target on the chip.
    pub fn user_targets(&self, soc: &str) -> Vec<String> {
        let Some(chip) = self.chip(soc) else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for core in chip.supported_cores() {
            targets.push(core.clone());
            for accel in &chip.accelerators {
                if accel.owners.contains(&core) {
                    targets.push(format!("{core}.{}", accel.name));
                }
            }
        }
        targets
    }
}

fn core(id: &str, family: &str) -> CoreRecord {
    CoreRecord {
        id: id.into(),
        family: Some(family.into()),
    }
}

fn builtin_chips() -> Vec<ChipRecord> {
    vec![
        ChipRecord {
            name: "MAX78000".into(),
            packages: vec!["CTBGA".into(), "WLP".into()],
            cores: vec![core("CM4", "CORTEX-M4"), core("RV", "RISC-V")],
            accelerators: vec![AcceleratorRecord {
                name: "CNN".into(),
                owners: vec!["CM4".into(), "RV".into()],
            }],
        },
        ChipRecord {
            name: "MAX78002".into(),
            packages: vec!["CSBGA".into()],
            cores: vec![core("CM4", "CORTEX-M4"), core("RV", "RISC-V")],
            accelerators: vec![AcceleratorRecord {
                name: "CNN".into(),
                owners: vec!["CM4".into(), "RV".into()],
            }],
        },
        ChipRecord {
            name: "MAX32690".into(),
            packages: vec!["TQFN".into(), "WLP".into()],
            cores: vec![core("CM4", "CORTEX-M4")],
            accelerators: Vec::new(),
        },
        ChipRecord {
            name: "MAX32657".into(),
            packages: vec!["WLP".into()],
            cores: vec![core("CM33", "CORTEX-M33")],
            accelerators: Vec::new(),
        },
    ]
}
