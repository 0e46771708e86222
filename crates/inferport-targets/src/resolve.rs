//! Target resolution: turn a user request into a validated [`ResolvedTarget`].

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{Result, TargetError};
use crate::hardware::{BackendTarget, HardwareSpec};
use crate::{canonical_name, canonical_opt};

/// What the user asked to deploy on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRequest {
    pub soc: String,
    pub package: Option<String>,
    pub core: String,
    pub accelerator: Option<String>,
    pub runtime: Option<String>,
    pub firmware_platform: Option<String>,
}

impl TargetRequest {
    pub fn new(soc: &str, core: &str) -> Self {
        Self {
            soc: soc.into(),
            core: core.into(),
            ..Self::default()
        }
    }

    pub fn with_package(mut self, package: Option<&str>) -> Self {
        self.package = package.map(Into::into);
        self
    }

    pub fn with_accelerator(mut self, accelerator: Option<&str>) -> Self {
        self.accelerator = accelerator.map(Into::into);
        self
    }

    pub fn with_runtime(mut self, runtime: Option<&str>) -> Self {
        self.runtime = runtime.map(Into::into);
        self
    }

    pub fn with_firmware_platform(mut self, firmware_platform: Option<&str>) -> Self {
        self.firmware_platform = firmware_platform.map(Into::into);
        self
    }
}

/// A fully validated deployment target.
///
/// Only [`Catalog::resolve`] constructs one from user input, so holding a
/// `ResolvedTarget` means the chip, core and accelerator ownership were all
/// checked. Fields are read-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedTarget {
    soc: String,
    core: String,
    family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accelerator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    firmware_platform: Option<String>,
}

impl ResolvedTarget {
    pub fn soc(&self) -> &str {
        &self.soc
    }

    pub fn core(&self) -> &str {
        &self.core
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn accelerator(&self) -> Option<&str> {
        self.accelerator.as_deref()
    }

    pub fn runtime(&self) -> Option<&str> {
        self.runtime.as_deref()
    }

    pub fn firmware_platform(&self) -> Option<&str> {
        self.firmware_platform.as_deref()
    }

    /// This target expressed as an explicit backend target.
    pub fn explicit_shape(&self) -> BackendTarget {
        BackendTarget {
            hardware: HardwareSpec::Explicit {
                soc: self.soc.clone(),
                core: self.core.clone(),
                accelerator: self.accelerator.clone(),
            },
            runtime: self.runtime.clone(),
            firmware_platform: self.firmware_platform.clone(),
        }
    }

    /// This target expressed as a family-generic backend target.
    pub fn generic_shape(&self) -> BackendTarget {
        BackendTarget {
            hardware: HardwareSpec::Generic {
                family: self.family.clone(),
                accelerator: self.accelerator.clone(),
            },
            runtime: self.runtime.clone(),
            firmware_platform: self.firmware_platform.clone(),
        }
    }
}

impl std::fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.soc, self.core)?;
        if let Some(accel) = &self.accelerator {
            write!(f, ".{accel}")?;
        }
        Ok(())
    }
}

impl Catalog {
    /// Validate a request against the catalog.
    ///
    /// Checks, in order: the chip exists and is AI-capable (and lists the
    /// package, if one was requested), the core exists on it, the core has a
    /// family, and any accelerator exists and is owned by the core.
    pub fn resolve(&self, request: &TargetRequest) -> Result<ResolvedTarget> {
        let soc = canonical_name(&request.soc);
        let package = canonical_opt(request.package.as_deref());
        let core_id = canonical_name(&request.core);
        let accelerator = canonical_opt(request.accelerator.as_deref());

        let display_soc = match &package {
            Some(pkg) => format!("{soc}[{pkg}]"),
            None => soc.clone(),
        };

        let chip = self
            .chip(&soc)
            .filter(|c| c.is_ai_capable())
            .filter(|c| package.as_deref().map_or(true, |p| c.has_package(p)));
        let Some(chip) = chip else {
            let supported = if package.is_some() {
                self.supported_soc_packages()
            } else {
                self.supported_socs()
            };
            return Err(TargetError::UnsupportedSoc {
                soc: display_soc,
                supported,
            });
        };

        let Some(core) = chip.core(&core_id) else {
            return Err(TargetError::UnsupportedCore {
                soc: display_soc,
                core: core_id,
                supported: chip.supported_cores(),
            });
        };

        let Some(family) = core.family.clone() else {
            return Err(TargetError::Configuration {
                detail: format!("{} does not have a specified family value", core.id),
            });
        };

        if let Some(accel_name) = &accelerator {
            let Some(accel) = chip.accelerator(accel_name) else {
                return Err(TargetError::UnsupportedAccelerator {
                    soc: display_soc,
                    accelerator: accel_name.clone(),
                    supported: chip.supported_accelerators(),
                });
            };
            if !accel.owners.contains(&core_id) {
                let mut owners = accel.owners.clone();
                owners.sort();
                return Err(TargetError::Ownership {
                    soc,
                    core: core_id,
                    accelerator: accel_name.clone(),
                    owners,
                });
            }
        }

        Ok(ResolvedTarget {
            soc,
            core: core_id,
            family,
            accelerator,
            runtime: canonical_opt(request.runtime.as_deref()),
            firmware_platform: canonical_opt(request.firmware_platform.as_deref()),
        })
    }

    /// Resolve an explicit chip/core target without a package.
    pub fn resolve_explicit_target(
        &self,
        soc: &str,
        core: &str,
        accelerator: Option<&str>,
        firmware_platform: Option<&str>,
        runtime: Option<&str>,
    ) -> Result<ResolvedTarget> {
        self.resolve(
            &TargetRequest::new(soc, core)
                .with_accelerator(accelerator)
                .with_firmware_platform(firmware_platform)
                .with_runtime(runtime),
        )
    }
}
