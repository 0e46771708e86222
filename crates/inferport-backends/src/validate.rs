//! Verification of a deployment plan into per-backend build batches.
//!
//! Everything here runs on the host before any worker exists: resolution,
//! selection and validation failures block dispatch entirely.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use inferport_targets::{canonical_name, Catalog, TargetRequest};

use crate::error::{BackendError, Result};
use crate::extensions::validate_extensions;
use crate::job::{BuildBatch, BuildJob, ProjectInfo};
use crate::plan::DeploymentPlan;
use crate::registry::BackendRegistry;

/// Check that no accelerator is claimed by two enabled jobs.
///
/// `claims` yields (job name, accelerator) for every enabled job in order.
/// The first job to name an accelerator owns it; a second claim fails and
/// names that first owner. Fails as well when there are no claims at all.
pub fn check_accelerator_claims<'a>(
    claims: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Result<()> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut any_enabled = false;
    for (job, accelerator) in claims {
        any_enabled = true;
        let Some(accelerator) = accelerator else {
            continue;
        };
        let accelerator = canonical_name(accelerator);
        if let Some(owner) = owners.get(&accelerator) {
            return Err(BackendError::AcceleratorConflict {
                accelerator,
                owner: (*owner).to_string(),
            });
        }
        owners.insert(accelerator, job);
    }
    if !any_enabled {
        return Err(BackendError::NoEnabledJobs);
    }
    Ok(())
}

/// Resolve, select and validate every enabled model of `plan`.
///
/// Returns one batch per backend in order of first use. Relative model and
/// network paths are taken relative to `workspace`, which is also where
/// project directories live.
pub fn verify_plan(
    catalog: &Catalog,
    registry: &BackendRegistry,
    plan: &DeploymentPlan,
    workspace: &Path,
) -> Result<Vec<BuildBatch>> {
    check_accelerator_claims(
        plan.iter_enabled()
            .map(|(_, m)| (m.name.as_str(), m.accelerator.as_deref())),
    )?;

    // Job names are unique across the whole plan, not only within a batch.
    let mut names = HashSet::new();
    for (_, model) in plan.iter_enabled() {
        if !names.insert(model.name.as_str()) {
            return Err(BackendError::DuplicateJob {
                name: model.name.clone(),
            });
        }
    }

    let mut batches: Vec<BuildBatch> = Vec::new();
    for (project, model) in plan.iter_enabled() {
        let request = TargetRequest::new(&plan.soc, model.core_in(project))
            .with_package(plan.package.as_deref())
            .with_accelerator(model.accelerator.as_deref())
            .with_runtime(model.runtime.as_deref())
            .with_firmware_platform(project.firmware_platform.as_deref());
        let target = catalog.resolve(&request)?;

        if !plan.has_project_for(target.core()) {
            return Err(BackendError::MissingProject {
                core: target.core().to_string(),
            });
        }

        let (backend_name, extensions) = match &model.backend {
            None => {
                let Some(found) = registry.find_backend(&target) else {
                    return Err(BackendError::NoMatchingBackend {
                        target: target.to_string(),
                    });
                };
                (found.to_string(), None)
            }
            Some(choice) => {
                let Some(backend) = registry.get(&choice.name) else {
                    return Err(BackendError::BackendNotFound {
                        name: choice.name.clone(),
                        available: registry.names(),
                    });
                };
                if !backend.support().can_support(&target) {
                    return Err(BackendError::CannotSupport {
                        backend: choice.name.clone(),
                        target: target.to_string(),
                    });
                }
                let extensions = validate_extensions(
                    backend.name(),
                    backend.extension_schema(),
                    choice.extensions.as_ref(),
                )?;
                (choice.name.clone(), extensions)
            }
        };
        debug!(job = %model.name, target = %target, backend = %backend_name, "verified job");

        let job = BuildJob::new(
            model.name.clone(),
            ProjectInfo::new(project.name.clone(), workspace, model.out_dir.clone()),
            workspace.join(&model.model),
            target,
            backend_name.clone(),
        )
        .with_extensions(extensions)
        .with_extra_network_file(model.network_config.as_ref().map(|p| workspace.join(p)));

        match batches
            .iter_mut()
            .find(|b| b.backend_name() == Some(backend_name.as_str()))
        {
            Some(batch) => batch.push(job)?,
            None => batches.push(BuildBatch::new(vec![job])?),
        }
    }

    info!(
        jobs = batches.iter().map(BuildBatch::len).sum::<usize>(),
        batches = batches.len(),
        "deployment plan verified"
    );
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claimant_owns_accelerator() {
        let claims = vec![("a", Some("CNN0")), ("b", None), ("c", Some("cnn0"))];
        let err = check_accelerator_claims(claims).unwrap_err();
        match err {
            BackendError::AcceleratorConflict { accelerator, owner } => {
                assert_eq!(accelerator, "CNN0");
                assert_eq!(owner, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn jobs_without_accelerator_exempt() {
        let claims = vec![("a", None), ("b", None), ("c", Some("CNN"))];
        assert!(check_accelerator_claims(claims).is_ok());
    }

    #[test]
    fn empty_batch_rejected() {
        let err = check_accelerator_claims(Vec::new()).unwrap_err();
        assert!(matches!(err, BackendError::NoEnabledJobs));
    }
}
