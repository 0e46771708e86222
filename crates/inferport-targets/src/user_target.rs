//! Compact target strings such as `max78002.cm4.cnn` or `max78000[ctbga].rv`.

use std::str::FromStr;

use crate::error::TargetError;
use crate::resolve::TargetRequest;
use crate::{canonical_name, canonical_opt};

/// A target written as `<soc>[<package>].<core>[.<accelerator>]`.
///
/// The package (in brackets) and the accelerator are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTarget {
    pub soc: String,
    pub package: Option<String>,
    pub core: String,
    pub accelerator: Option<String>,
}

impl UserTarget {
    /// Build a resolution request from this target.
    pub fn to_request(
        &self,
        runtime: Option<&str>,
        firmware_platform: Option<&str>,
    ) -> TargetRequest {
        TargetRequest::new(&self.soc, &self.core)
            .with_package(self.package.as_deref())
            .with_accelerator(self.accelerator.as_deref())
            .with_runtime(runtime)
            .with_firmware_platform(firmware_platform)
    }
}

fn invalid(input: &str, reason: &str) -> TargetError {
    TargetError::InvalidUserTarget {
        input: input.into(),
        reason: reason.into(),
    }
}

impl FromStr for UserTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid(
                s,
                "expected <soc>[<package>].<core> optionally followed by .<accelerator>",
            ));
        }
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid(s, "empty target component"));
        }

        let (soc, package) = match parts[0].split_once('[') {
            Some((soc, rest)) => {
                let Some(package) = rest.strip_suffix(']') else {
                    return Err(invalid(s, "unterminated package, expected <soc>[<package>]"));
                };
                if soc.is_empty() || package.is_empty() || package.contains(['[', ']']) {
                    return Err(invalid(s, "malformed <soc>[<package>] component"));
                }
                (soc, Some(package))
            }
            None if parts[0].contains(']') => {
                return Err(invalid(s, "malformed <soc>[<package>] component"));
            }
            None => (parts[0], None),
        };

        Ok(UserTarget {
            soc: canonical_name(soc),
            package: canonical_opt(package),
            core: canonical_name(parts[1]),
            accelerator: canonical_opt(parts.get(2).copied()),
        })
    }
}

impl std::fmt::Display for UserTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.soc)?;
        if let Some(pkg) = &self.package {
            write!(f, "[{pkg}]")?;
        }
        write!(f, ".{}", self.core)?;
        if let Some(accel) = &self.accelerator {
            write!(f, ".{accel}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_soc_and_core() {
        let t: UserTarget = "max78002.cm4".parse().unwrap();
        assert_eq!(t.soc, "MAX78002");
        assert_eq!(t.package, None);
        assert_eq!(t.core, "CM4");
        assert_eq!(t.accelerator, None);
    }

    #[test]
    fn parse_with_package_and_accelerator() {
        let t: UserTarget = "max78000[ctbga].rv.cnn".parse().unwrap();
        assert_eq!(t.package.as_deref(), Some("CTBGA"));
        assert_eq!(t.accelerator.as_deref(), Some("CNN"));
        assert_eq!(t.to_string(), "MAX78000[CTBGA].RV.CNN");
    }

    #[test]
    fn dashed_soc_names_parse() {
        let t: UserTarget = "ADSP-SC835.FX".parse().unwrap();
        assert_eq!(t.soc, "ADSP-SC835");
        assert_eq!(t.core, "FX");
    }

    #[test]
    fn rejects_bad_shapes() {
        for input in ["max78002", "a.b.c.d", "max78002..cnn", "max[pkg.cm4", "max]x.cm4", "[pkg].cm4"] {
            let err = input.parse::<UserTarget>().unwrap_err();
            assert!(
                matches!(err, TargetError::InvalidUserTarget { .. }),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn request_carries_runtime_and_firmware() {
        let t: UserTarget = "max78002.cm4".parse().unwrap();
        let req = t.to_request(Some("tflm"), Some("zephyr"));
        assert_eq!(req.soc, "MAX78002");
        assert_eq!(req.runtime.as_deref(), Some("tflm"));
        assert_eq!(req.firmware_platform.as_deref(), Some("zephyr"));
    }
}
