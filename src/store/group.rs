//! Grouping helpers for hierarchical display

use crate::model::Resource;
use std::collections::BTreeMap;

/// Records whose `project_id` is `parent`, keyed by service tag.
/// Order inside each group follows the snapshot.
pub fn children_by_service(records: &[Resource], parent: &str) -> BTreeMap<String, Vec<Resource>> {
    let mut grouped: BTreeMap<String, Vec<Resource>> = BTreeMap::new();

    for res in records.iter().filter(|r| r.parent_project() == Some(parent)) {
        grouped
            .entry(res.service.to_string())
            .or_default()
            .push(res.clone());
    }

    grouped
}

/// Every record with a `project_id`, keyed by parent then by service tag.
/// Records without a parent (projects, folders, AWS) are left out.
pub fn group_by_parent(records: &[Resource]) -> BTreeMap<&str, BTreeMap<&str, Vec<&Resource>>> {
    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&Resource>>> = BTreeMap::new();

    for res in records {
        let Some(parent) = res.parent_project() else {
            continue;
        };
        grouped
            .entry(parent)
            .or_default()
            .entry(res.service.as_str())
            .or_default()
            .push(res);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{attr, Provider, ServiceKind};

    fn records() -> Vec<Resource> {
        vec![
            Resource::new(Provider::Gcp, ServiceKind::Project, "global", "p1", "P1"),
            Resource::new(Provider::Gcp, ServiceKind::Vpc, "global", "a", "a")
                .with_attr(attr::PROJECT_ID, "p1"),
            Resource::new(Provider::Gcp, ServiceKind::Firewall, "global", "fw", "fw")
                .with_attr(attr::PROJECT_ID, "p1"),
            Resource::new(Provider::Gcp, ServiceKind::Vpc, "global", "b", "b")
                .with_attr(attr::PROJECT_ID, "p1"),
            Resource::new(Provider::Gcp, ServiceKind::Vpc, "global", "c", "c")
                .with_attr(attr::PROJECT_ID, "p2"),
        ]
    }

    #[test]
    fn test_children_grouped_by_service_in_store_order() {
        let grouped = children_by_service(&records(), "p1");
        assert_eq!(grouped.len(), 2);
        let vpcs: Vec<&str> = grouped["vpc"].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(vpcs, vec!["a", "b"]);
        assert_eq!(grouped["firewall"].len(), 1);
    }

    #[test]
    fn test_unknown_parent_yields_nothing() {
        assert!(children_by_service(&records(), "nope").is_empty());
    }

    #[test]
    fn test_group_by_parent_skips_parentless() {
        let all = records();
        let grouped = group_by_parent(&all);
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec!["p1", "p2"]);
        assert_eq!(grouped["p1"]["vpc"].len(), 2);
        assert_eq!(grouped["p2"]["vpc"].len(), 1);
    }
}
