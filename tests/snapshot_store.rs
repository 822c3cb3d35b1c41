//! Property-based tests for the snapshot store
//!
//! Every case runs against its own temporary directory.

use infrakit::model::{attr, Provider, Resource, ServiceKind};
use infrakit::store::SnapshotStore;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

const PROJECTS: [&str; 3] = ["p-alpha", "p-beta", "p-gamma"];

fn arb_extra_attrs() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,20}", 0..4)
}

fn with_attrs(mut res: Resource, extra: BTreeMap<String, String>) -> Resource {
    for (key, value) in extra {
        res = res.with_attr(&key, value);
    }
    res
}

/// A project record
fn arb_project() -> impl Strategy<Value = Resource> {
    (prop::sample::select(PROJECTS.to_vec()), "[ -~]{0,24}").prop_map(|(id, name)| {
        Resource::new(Provider::Gcp, ServiceKind::Project, "global", id, &name)
            .with_attr(attr::STATE, "ACTIVE")
    })
}

/// A record owned by one of the projects
fn arb_child_of(projects: Vec<&'static str>) -> impl Strategy<Value = Resource> {
    (
        prop::sample::select(projects),
        prop::sample::select(vec![
            ServiceKind::Vpc,
            ServiceKind::Subnet,
            ServiceKind::Firewall,
            ServiceKind::CloudRun,
            ServiceKind::ForwardingRule,
        ]),
        "[a-z][a-z0-9-]{0,20}",
        "[ -~]{0,24}",
        arb_extra_attrs(),
    )
        .prop_map(|(project, service, id, name, extra)| {
            with_attrs(Resource::new(Provider::Gcp, service, "global", &id, &name), extra)
                .with_attr(attr::PROJECT_ID, project)
        })
}

/// An AWS record, which never belongs to a GCP project
fn arb_aws() -> impl Strategy<Value = Resource> {
    ("i-[0-9a-f]{8}", "[ -~]{0,24}", arb_extra_attrs()).prop_map(|(id, name, extra)| {
        with_attrs(Resource::new(Provider::Aws, ServiceKind::Ec2, "us-east-1", &id, &name), extra)
    })
}

fn arb_snapshot() -> impl Strategy<Value = Vec<Resource>> {
    prop::collection::vec(
        prop_oneof![arb_project(), arb_child_of(PROJECTS.to_vec()), arb_aws()],
        0..40,
    )
}

/// Fresh records for `p-alpha`: the project itself and some children
fn arb_alpha_records() -> impl Strategy<Value = Vec<Resource>> {
    (
        any::<bool>(),
        prop::collection::vec(arb_child_of(vec!["p-alpha"]), 0..10),
    )
        .prop_map(|(with_project, children)| {
            let mut records = Vec::new();
            if with_project {
                records.push(
                    Resource::new(Provider::Gcp, ServiceKind::Project, "global", "p-alpha", "Alpha")
                        .with_attr(attr::STATE, "ACTIVE"),
                );
            }
            records.extend(children);
            records
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever is saved is loaded back unchanged and in order
    #[test]
    fn prop_save_load_round_trip(records in arb_snapshot()) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save(&records).unwrap();
        prop_assert_eq!(store.load().unwrap(), records);
    }

    /// Merging a scope keeps everything else in order and appends the new records
    #[test]
    fn prop_merge_replaces_only_the_scope(
        existing in arb_snapshot(),
        fresh in arb_alpha_records(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&existing).unwrap();

        let outside: Vec<Resource> = existing
            .iter()
            .filter(|r| !r.belongs_to_scope("p-alpha"))
            .cloned()
            .collect();

        let report = store.merge_scope(fresh.clone(), "p-alpha").unwrap();
        prop_assert_eq!(report.retained, outside.len());
        prop_assert_eq!(report.removed, existing.len() - outside.len());
        prop_assert_eq!(report.added, fresh.len());

        let mut expected = outside;
        expected.extend(fresh);
        prop_assert_eq!(store.load().unwrap(), expected);
    }

    /// Merging the same fetch twice changes nothing the second time
    #[test]
    fn prop_merge_is_idempotent(
        existing in arb_snapshot(),
        fresh in arb_alpha_records(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&existing).unwrap();

        store.merge_scope(fresh.clone(), "p-alpha").unwrap();
        let once = store.load().unwrap();

        let report = store.merge_scope(fresh.clone(), "p-alpha").unwrap();
        prop_assert_eq!(report.removed, fresh.len());
        prop_assert_eq!(store.load().unwrap(), once);
    }

    /// An empty merge wipes the scope and nothing else
    #[test]
    fn prop_empty_merge_wipes_scope(existing in arb_snapshot()) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&existing).unwrap();

        store.merge_scope(Vec::new(), "p-alpha").unwrap();
        let after = store.load().unwrap();

        prop_assert!(after.iter().all(|r| !r.belongs_to_scope("p-alpha")));
        let others_before = existing.iter().filter(|r| r.belongs_to_scope("p-beta")).count();
        let others_after = after.iter().filter(|r| r.belongs_to_scope("p-beta")).count();
        prop_assert_eq!(others_before, others_after);
    }
}

/// Merging into a directory with no snapshot yet creates it
#[test]
fn test_merge_into_missing_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("nested"));

    let fresh = vec![Resource::new(Provider::Gcp, ServiceKind::Project, "global", "p-alpha", "Alpha")];
    let report = store.merge_scope(fresh.clone(), "p-alpha").unwrap();

    assert_eq!(report.retained, 0);
    assert_eq!(report.added, 1);
    assert_eq!(store.load().unwrap(), fresh);
}

/// No temporary files are left next to the snapshot
#[test]
fn test_no_leftover_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());

    store
        .save(&[Resource::new(Provider::Aws, ServiceKind::Ec2, "us-east-1", "i-1", "web")])
        .unwrap();
    store.merge_scope(Vec::new(), "p-alpha").unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
