//! What a backend can build for, and the matching rules that decide whether
//! it can serve a resolved target.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use inferport_targets::{canonical_name, BackendTarget, HardwareSpec, ResolvedTarget};

use crate::error::{BackendError, Result};

/// How a target matched a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// The explicit or generic shape of the target is listed verbatim.
    Exact,
    /// Matched only after filtering by runtime and firmware platform.
    Relaxed,
}

/// The targeting information a project provides before any model is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinProjectTarget {
    pub soc: String,
    pub core: String,
    pub family: String,
    pub firmware_platform: Option<String>,
}

impl MinProjectTarget {
    pub fn new(soc: &str, core: &str, family: &str, firmware_platform: Option<&str>) -> Self {
        Self {
            soc: canonical_name(soc),
            core: canonical_name(core),
            family: canonical_name(family),
            firmware_platform: firmware_platform.map(canonical_name),
        }
    }
}

/// A backend's declared support.
///
/// Every runtime and firmware platform used by a target must be declared in
/// `runtimes` / `firmware_platforms`; [`SupportedBackend::new`] enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SupportedBackend {
    pub name: String,
    #[serde(default)]
    pub targets: Vec<BackendTarget>,
    #[serde(default)]
    pub runtimes: Vec<String>,
    #[serde(default)]
    pub firmware_platforms: Vec<String>,
}

impl SupportedBackend {
    /// Canonicalize all names and check the forward declarations.
    pub fn new(
        name: &str,
        targets: Vec<BackendTarget>,
        runtimes: Vec<String>,
        firmware_platforms: Vec<String>,
    ) -> Result<Self> {
        let backend = Self {
            name: name.trim().to_string(),
            targets: targets.iter().map(BackendTarget::normalized).collect(),
            runtimes: runtimes.iter().map(|r| canonical_name(r)).collect(),
            firmware_platforms: firmware_platforms.iter().map(|f| canonical_name(f)).collect(),
        };
        backend.check_forward_declarations()?;
        Ok(backend)
    }

    fn check_forward_declarations(&self) -> Result<()> {
        for t in &self.targets {
            if let Some(runtime) = &t.runtime {
                if !self.runtimes.contains(runtime) {
                    return Err(BackendError::UndeclaredRuntime {
                        backend: self.name.clone(),
                        runtime: runtime.clone(),
                        declared: self.runtimes.clone(),
                    });
                }
            }
            if let Some(fw) = &t.firmware_platform {
                if !self.firmware_platforms.contains(fw) {
                    return Err(BackendError::UndeclaredFirmwarePlatform {
                        backend: self.name.clone(),
                        firmware_platform: fw.clone(),
                        declared: self.firmware_platforms.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether this backend can serve `target`.
    pub fn can_support(&self, target: &ResolvedTarget) -> bool {
        self.match_phase(target).is_some()
    }

    /// Which matching phase accepts `target`, if any.
    ///
    /// The exact phase looks for the target's explicit or generic shape
    /// verbatim. Only if that fails, targets are filtered: a requested
    /// runtime must be equal, a requested firmware platform must be equal
    /// or absent on the backend side. The hardware is then compared alone.
    pub fn match_phase(&self, target: &ResolvedTarget) -> Option<MatchPhase> {
        let explicit = target.explicit_shape();
        let generic = target.generic_shape();
        if self.targets.iter().any(|t| *t == explicit || *t == generic) {
            return Some(MatchPhase::Exact);
        }

        let relaxed = self
            .targets
            .iter()
            .filter(|t| target.runtime().map_or(true, |r| t.runtime.as_deref() == Some(r)))
            .filter(|t| {
                target.firmware_platform().map_or(true, |fw| {
                    t.firmware_platform.is_none() || t.firmware_platform.as_deref() == Some(fw)
                })
            });
        if hardware_matches(relaxed, target) {
            Some(MatchPhase::Relaxed)
        } else {
            None
        }
    }

    /// Whether any target covers the hardware of `target`, ignoring software.
    pub fn can_support_hardware(&self, target: &ResolvedTarget) -> bool {
        hardware_matches(self.targets.iter(), target)
    }

    /// Targets able to serve a project before a model is configured.
    pub fn min_prj_targets(&self, project: &MinProjectTarget) -> Vec<&BackendTarget> {
        self.targets
            .iter()
            .filter(|t| supports_min_project(t, project))
            .collect()
    }

    pub fn can_support_min_prj(&self, project: &MinProjectTarget) -> bool {
        self.targets.iter().any(|t| supports_min_project(t, project))
    }

    /// Firmware platforms usable with a project's hardware. `None` in the
    /// result means a firmware-agnostic target exists.
    pub fn supported_firmware_platforms(
        &self,
        project: &MinProjectTarget,
    ) -> BTreeSet<Option<String>> {
        self.targets
            .iter()
            .filter(|t| match &t.hardware {
                HardwareSpec::Explicit { soc, core, .. } => {
                    *soc == project.soc && *core == project.core
                }
                HardwareSpec::Generic { family, .. } => *family == project.family,
            })
            .map(|t| t.firmware_platform.clone())
            .collect()
    }

    /// Chips named by explicit targets, sorted.
    pub fn supported_socs(&self) -> Vec<String> {
        let socs: BTreeSet<String> = self
            .targets
            .iter()
            .filter_map(|t| match &t.hardware {
                HardwareSpec::Explicit { soc, .. } => Some(soc.clone()),
                HardwareSpec::Generic { .. } => None,
            })
            .collect();
        socs.into_iter().collect()
    }

    /// Cores on `soc` named by explicit targets, sorted.
    pub fn supported_cores(&self, soc: &str) -> Vec<String> {
        let soc = canonical_name(soc);
        let cores: BTreeSet<String> = self
            .targets
            .iter()
            .filter_map(|t| match &t.hardware {
                HardwareSpec::Explicit { soc: s, core, .. } if *s == soc => Some(core.clone()),
                _ => None,
            })
            .collect();
        cores.into_iter().collect()
    }

    /// Accelerators on `soc` reachable through `core`, sorted.
    pub fn supported_accelerators(&self, soc: &str, core: &str) -> Vec<String> {
        let soc = canonical_name(soc);
        let core = canonical_name(core);
        let accels: BTreeSet<String> = self
            .targets
            .iter()
            .filter_map(|t| match &t.hardware {
                HardwareSpec::Explicit {
                    soc: s,
                    core: c,
                    accelerator: Some(a),
                } if *s == soc && *c == core => Some(a.clone()),
                _ => None,
            })
            .collect();
        accels.into_iter().collect()
    }
}

/// Explicit-or-generic structural test on hardware alone.
///
/// The generic shape carries the accelerator too, so a family-level target
/// never matches a request that asks for an accelerator it does not list.
fn hardware_matches<'a>(
    targets: impl IntoIterator<Item = &'a BackendTarget>,
    target: &ResolvedTarget,
) -> bool {
    let explicit = target.explicit_shape().hardware;
    let generic = target.generic_shape().hardware;
    targets
        .into_iter()
        .any(|t| t.hardware == explicit || t.hardware == generic)
}

fn supports_min_project(t: &BackendTarget, project: &MinProjectTarget) -> bool {
    let fw = match (&t.firmware_platform, &project.firmware_platform) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => true,
    };
    let hw = match &t.hardware {
        HardwareSpec::Explicit { soc, core, .. } => *soc == project.soc && *core == project.core,
        HardwareSpec::Generic { family, .. } => *family == project.family,
    };
    fw && hw
}
