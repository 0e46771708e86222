//! Hardware descriptors advertised by backends.
//!
//! A backend states what it can build for as a list of [`BackendTarget`]s.
//! The hardware part is either *explicit* (a named chip and core) or
//! *generic* (any core of an architecture family).

use serde::{Deserialize, Serialize};

use crate::{canonical_name, canonical_opt};

/// The hardware half of a backend target.
///
/// Two specs are the same target exactly when all their fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HardwareSpec {
    /// A specific core on a specific chip.
    Explicit {
        soc: String,
        core: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accelerator: Option<String>,
    },
    /// Any core of the given architecture family.
    Generic {
        family: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accelerator: Option<String>,
    },
}

impl HardwareSpec {
    /// Explicit spec with canonical names.
    pub fn explicit(soc: &str, core: &str, accelerator: Option<&str>) -> Self {
        HardwareSpec::Explicit {
            soc: canonical_name(soc),
            core: canonical_name(core),
            accelerator: canonical_opt(accelerator),
        }
    }

    /// Generic spec with canonical names.
    pub fn generic(family: &str, accelerator: Option<&str>) -> Self {
        HardwareSpec::Generic {
            family: canonical_name(family),
            accelerator: canonical_opt(accelerator),
        }
    }

    /// The accelerator this spec targets, if any.
    pub fn accelerator(&self) -> Option<&str> {
        match self {
            HardwareSpec::Explicit { accelerator, .. }
            | HardwareSpec::Generic { accelerator, .. } => accelerator.as_deref(),
        }
    }

    /// Re-spell every name canonically (used after deserializing).
    pub fn normalized(&self) -> Self {
        match self {
            HardwareSpec::Explicit {
                soc,
                core,
                accelerator,
            } => HardwareSpec::explicit(soc, core, accelerator.as_deref()),
            HardwareSpec::Generic {
                family,
                accelerator,
            } => HardwareSpec::generic(family, accelerator.as_deref()),
        }
    }
}

impl std::fmt::Display for HardwareSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareSpec::Explicit {
                soc,
                core,
                accelerator,
            } => {
                write!(f, "{soc}.{core}")?;
                if let Some(accel) = accelerator {
                    write!(f, ".{accel}")?;
                }
                Ok(())
            }
            HardwareSpec::Generic {
                family,
                accelerator,
            } => {
                write!(f, "<{family}>")?;
                if let Some(accel) = accelerator {
                    write!(f, ".{accel}")?;
                }
                Ok(())
            }
        }
    }
}

/// One (hardware, runtime, firmware platform) combination a backend supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendTarget {
    pub hardware: HardwareSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Absent means the backend does not depend on the firmware platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_platform: Option<String>,
}

impl BackendTarget {
    pub fn new(
        hardware: HardwareSpec,
        runtime: Option<&str>,
        firmware_platform: Option<&str>,
    ) -> Self {
        Self {
            hardware: hardware.normalized(),
            runtime: canonical_opt(runtime),
            firmware_platform: canonical_opt(firmware_platform),
        }
    }

    /// Re-spell every name canonically (used after deserializing).
    pub fn normalized(&self) -> Self {
        Self::new(
            self.hardware.clone(),
            self.runtime.as_deref(),
            self.firmware_platform.as_deref(),
        )
    }
}

impl std::fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hardware)?;
        if let Some(runtime) = &self.runtime {
            write!(f, " runtime={runtime}")?;
        }
        match &self.firmware_platform {
            Some(fw) => write!(f, " firmware-platform={fw}"),
            None => write!(f, " firmware-platform=*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_canonicalize() {
        let spec = HardwareSpec::explicit("max78002", " cm4 ", Some("cnn"));
        assert_eq!(
            spec,
            HardwareSpec::Explicit {
                soc: "MAX78002".into(),
                core: "CM4".into(),
                accelerator: Some("CNN".into()),
            }
        );
        assert_eq!(spec.accelerator(), Some("CNN"));
    }

    #[test]
    fn explicit_and_generic_never_equal() {
        let a = HardwareSpec::explicit("MAX78002", "CM4", None);
        let b = HardwareSpec::generic("CM4", None);
        assert_ne!(a, b);
    }

    #[test]
    fn deserialize_tagged() {
        let json = r#"{"hardware":{"kind":"generic","family":"cortex-m4"},"runtime":"tflm"}"#;
        let target: BackendTarget = serde_json::from_str(json).unwrap();
        let target = target.normalized();
        assert_eq!(target.hardware, HardwareSpec::generic("CORTEX-M4", None));
        assert_eq!(target.runtime.as_deref(), Some("TFLM"));
        assert_eq!(target.firmware_platform, None);
    }

    #[test]
    fn display_marks_wildcard_firmware() {
        let target = BackendTarget::new(HardwareSpec::generic("cortex-m4", None), Some("tflm"), None);
        assert_eq!(target.to_string(), "<CORTEX-M4> runtime=TFLM firmware-platform=*");
    }
}
