//! Catalog-wide resolution properties.

use inferport_targets::{
    AcceleratorRecord, Catalog, ChipRecord, CoreRecord, TargetError, UserTarget,
};

fn core(id: &str, family: Option<&str>) -> CoreRecord {
    CoreRecord {
        id: id.into(),
        family: family.map(Into::into),
    }
}

/// MAX78002 whose CNN can only be driven by the RISC-V core.
fn rv_only_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .insert(ChipRecord {
            name: "MAX78002".into(),
            packages: Vec::new(),
            cores: vec![core("CM4", Some("CORTEX-M4")), core("RV", Some("RISC-V"))],
            accelerators: vec![AcceleratorRecord {
                name: "CNN".into(),
                owners: vec!["RV".into()],
            }],
        })
        .unwrap();
    catalog
}

#[test]
fn every_catalog_core_resolves_to_its_family() {
    let catalog = Catalog::builtin();
    for chip in catalog.chips() {
        for c in &chip.cores {
            let target = catalog
                .resolve_explicit_target(&chip.name, &c.id, None, None, None)
                .unwrap();
            assert_eq!(Some(target.family()), c.family.as_deref());
        }
    }
}

#[test]
fn non_owners_fail_with_exact_owner_list() {
    let catalog = rv_only_catalog();
    for chip in catalog.chips() {
        for accel in &chip.accelerators {
            for c in chip.cores.iter().filter(|c| !accel.owners.contains(&c.id)) {
                let err = catalog
                    .resolve_explicit_target(&chip.name, &c.id, Some(&accel.name), None, None)
                    .unwrap_err();
                let mut owners = accel.owners.clone();
                owners.sort();
                assert!(matches!(err, TargetError::Ownership { .. }));
                assert_eq!(err.alternatives(), owners);
            }
        }
    }
}

#[test]
fn resolution_is_idempotent() {
    let catalog = Catalog::builtin();
    let first = catalog
        .resolve_explicit_target("MAX78000", "RV", Some("CNN"), Some("MSDK"), Some("IZER"))
        .unwrap();
    let second = catalog
        .resolve_explicit_target("MAX78000", "RV", Some("CNN"), Some("MSDK"), Some("IZER"))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn cm4_cannot_drive_rv_only_cnn() {
    let catalog = rv_only_catalog();
    let err = catalog
        .resolve_explicit_target("MAX78002", "CM4", Some("CNN"), None, None)
        .unwrap_err();
    match &err {
        TargetError::Ownership { owners, .. } => assert_eq!(owners, &vec!["RV".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "Core CM4 cannot manage accelerator CNN on SoC MAX78002\nBut the following are supported\n  - RV"
    );
}

#[test]
fn core_without_family_is_a_configuration_fault() {
    let mut catalog = Catalog::new();
    catalog
        .insert(ChipRecord {
            name: "MAX32655".into(),
            packages: Vec::new(),
            cores: vec![core("CM4", None)],
            accelerators: Vec::new(),
        })
        .unwrap();
    let err = catalog
        .resolve_explicit_target("MAX32655", "CM4", None, None, None)
        .unwrap_err();
    assert!(matches!(err, TargetError::Configuration { .. }));
    assert!(err.to_string().contains("CM4 does not have a specified family value"));
}

#[test]
fn every_listed_user_target_resolves() {
    let catalog = Catalog::builtin();
    for soc in catalog.supported_socs() {
        for suffix in catalog.user_targets(&soc) {
            let target: UserTarget = format!("{soc}.{suffix}").parse().unwrap();
            catalog.resolve(&target.to_request(None, None)).unwrap();
        }
    }
}
