//! Catalog index (RESTMapper) derived from one discovery fetch.

use std::sync::Arc;

use resref_core::{
    DiscoveryRecord, Error, GroupKind, GroupResource, GroupVersionKind, GroupVersionResource, Result,
    RestMapping,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Outcome of an index lookup. Ambiguity is a value, never a silent pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Unique(T),
    Ambiguous(Ambiguity),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ambiguity {
    /// One kind, several versions, none (or more than one) declared preferred.
    Versions(Vec<String>),
    /// Several kinds, typically the same name served by different groups.
    Kinds(Vec<GroupVersionKind>),
}

impl<T> Resolution<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Unique(t) => Resolution::Unique(f(t)),
            Resolution::Ambiguous(a) => Resolution::Ambiguous(a),
            Resolution::NotFound => Resolution::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NameHit {
    record: usize,
    /// Matched only through a short name
    short: bool,
}

/// Immutable lookup tables over a record set. Rebuilt wholesale, never patched.
pub struct CatalogIndex {
    records: Arc<[DiscoveryRecord]>,
    /// lowercase plural/singular/short name -> records, discovery order
    by_name: FxHashMap<String, SmallVec<[NameHit; 2]>>,
    /// (group, kind) -> records, version priority order
    by_group_kind: FxHashMap<GroupKind, SmallVec<[usize; 2]>>,
}

impl CatalogIndex {
    pub fn new(records: Arc<[DiscoveryRecord]>) -> Self {
        let mut by_name: FxHashMap<String, SmallVec<[NameHit; 2]>> = FxHashMap::default();
        let mut by_group_kind: FxHashMap<GroupKind, SmallVec<[usize; 2]>> = FxHashMap::default();

        for (i, r) in records.iter().enumerate() {
            let mut add = |name: String, short: bool| {
                let hits = by_name.entry(name).or_default();
                match hits.iter_mut().find(|h| h.record == i) {
                    Some(h) => h.short &= short,
                    None => hits.push(NameHit { record: i, short }),
                }
            };
            add(r.resource.to_lowercase(), false);
            add(r.singular_name(), false);
            for s in &r.short_names {
                add(s.to_lowercase(), true);
            }
            by_group_kind.entry(GroupKind::gk(&r.group, &r.kind)).or_default().push(i);
        }

        Self { records, by_name, by_group_kind }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Served versions of a kind, in priority order.
    pub fn versions_for(&self, gk: &GroupKind) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for &i in self.by_group_kind.get(gk).into_iter().flatten() {
            let v = self.records[i].version.as_str();
            if !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }

    /// Resolve a resource name to a kind. An empty group matches any group,
    /// an empty version matches any version.
    pub fn resolve_kind(&self, gvr: &GroupVersionResource) -> Resolution<GroupVersionKind> {
        let name = gvr.resource.to_lowercase();
        let Some(hits) = self.by_name.get(&name) else {
            return Resolution::NotFound;
        };
        let in_scope: SmallVec<[NameHit; 4]> = hits
            .iter()
            .copied()
            .filter(|h| {
                let r = &self.records[h.record];
                (gvr.group.is_empty() || r.group.eq_ignore_ascii_case(&gvr.group))
                    && (gvr.version.is_empty() || r.version.eq_ignore_ascii_case(&gvr.version))
            })
            .collect();
        // shortcut expansion only applies when no real resource carries the name
        let any_exact = in_scope.iter().any(|h| !h.short);
        let candidates: SmallVec<[&DiscoveryRecord; 4]> = in_scope
            .iter()
            .filter(|h| !(any_exact && h.short))
            .map(|h| &self.records[h.record])
            .collect();
        if candidates.is_empty() {
            return Resolution::NotFound;
        }

        let first = candidates[0];
        if candidates.iter().any(|r| r.group != first.group || r.kind != first.kind) {
            let mut gvks: Vec<GroupVersionKind> = Vec::new();
            for r in &candidates {
                let gvk = r.gvk();
                if !gvks.contains(&gvk) {
                    gvks.push(gvk);
                }
            }
            return Resolution::Ambiguous(Ambiguity::Kinds(gvks));
        }
        pick_version(&candidates).map(|r| r.gvk())
    }

    /// `resolve_kind` with the outcome turned into an error for everything but a unique match.
    pub fn kind_for(&self, gvr: &GroupVersionResource) -> Result<GroupVersionKind> {
        match self.resolve_kind(gvr) {
            Resolution::Unique(gvk) => Ok(gvk),
            Resolution::NotFound => Err(Error::NoResourceMatch { resource: describe(gvr) }),
            Resolution::Ambiguous(Ambiguity::Versions(versions)) => {
                Err(Error::AmbiguousVersion { resource: describe(gvr), versions })
            }
            Resolution::Ambiguous(Ambiguity::Kinds(candidates)) => {
                Err(Error::AmbiguousResource { resource: describe(gvr), candidates })
            }
        }
    }

    /// Find the collection serving `gk` at `version`; an empty version picks the preferred one.
    pub fn resolve_mapping(&self, gk: &GroupKind, version: &str) -> Resolution<RestMapping> {
        let Some(idxs) = self.by_group_kind.get(gk) else {
            return Resolution::NotFound;
        };
        let records: SmallVec<[&DiscoveryRecord; 4]> = idxs.iter().map(|&i| &self.records[i]).collect();
        if !version.is_empty() {
            return match records.iter().find(|r| r.version == version) {
                Some(r) => Resolution::Unique(mapping(r)),
                None => Resolution::NotFound,
            };
        }
        pick_version(&records).map(mapping)
    }

    pub fn rest_mapping(&self, gk: &GroupKind, version: &str) -> Result<RestMapping> {
        match self.resolve_mapping(gk, version) {
            Resolution::Unique(m) => Ok(m),
            Resolution::NotFound => Err(Error::NoKindMatch { group_kind: gk.clone(), version: version.to_string() }),
            Resolution::Ambiguous(Ambiguity::Versions(versions)) => {
                Err(Error::AmbiguousVersion { resource: gk.to_string(), versions })
            }
            Resolution::Ambiguous(Ambiguity::Kinds(candidates)) => {
                Err(Error::AmbiguousResource { resource: gk.to_string(), candidates })
            }
        }
    }
}

/// All candidates share one (group, kind). A single version wins outright,
/// otherwise exactly one version must be declared preferred.
fn pick_version<'a>(candidates: &[&'a DiscoveryRecord]) -> Resolution<&'a DiscoveryRecord> {
    let mut versions: Vec<String> = Vec::new();
    for r in candidates {
        if !versions.contains(&r.version) {
            versions.push(r.version.clone());
        }
    }
    if versions.len() == 1 {
        return Resolution::Unique(candidates[0]);
    }
    let mut preferred: Option<&'a DiscoveryRecord> = None;
    for &r in candidates.iter().filter(|r| r.preferred) {
        match preferred {
            None => preferred = Some(r),
            Some(p) if p.version == r.version => {}
            Some(_) => return Resolution::Ambiguous(Ambiguity::Versions(versions)),
        }
    }
    match preferred {
        Some(r) => Resolution::Unique(r),
        None => Resolution::Ambiguous(Ambiguity::Versions(versions)),
    }
}

fn mapping(r: &DiscoveryRecord) -> RestMapping {
    RestMapping { resource: r.gvr(), group_version_kind: r.gvk(), scope: r.scope() }
}

/// Echo a query back in the `resource[.version].group` form it was typed in.
fn describe(gvr: &GroupVersionResource) -> String {
    if gvr.version.is_empty() {
        GroupResource::gr(&gvr.group, &gvr.resource).to_string()
    } else if gvr.group.is_empty() {
        format!("{}.{}", gvr.resource, gvr.version)
    } else {
        format!("{}.{}.{}", gvr.resource, gvr.version, gvr.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resref_core::Scope;

    fn index(records: Vec<DiscoveryRecord>) -> CatalogIndex {
        CatalogIndex::new(records.into())
    }

    fn gr(group: &str, resource: &str) -> GroupVersionResource {
        GroupVersionResource::gvr(group, "", resource)
    }

    #[test]
    fn matches_plural_singular_and_short_names() {
        let idx = index(vec![DiscoveryRecord::new("", "v1", "pods", "Pod").short_names(&["po"]).preferred()]);
        for name in ["pods", "pod", "po", "PO", "Pods"] {
            assert_eq!(idx.kind_for(&gr("", name)).unwrap(), GroupVersionKind::gvk("", "v1", "Pod"), "{name}");
        }
        assert!(matches!(idx.resolve_kind(&gr("", "p")), Resolution::NotFound));
        assert!(matches!(idx.resolve_kind(&gr("", "podss")), Resolution::NotFound));
    }

    #[test]
    fn group_filters_candidates() {
        let idx = index(vec![
            DiscoveryRecord::new("", "v1", "events", "Event").short_names(&["ev"]).preferred(),
            DiscoveryRecord::new("events.k8s.io", "v1", "events", "Event").short_names(&["ev"]).preferred(),
        ]);
        match idx.resolve_kind(&gr("", "events")) {
            Resolution::Ambiguous(Ambiguity::Kinds(k)) => assert_eq!(k.len(), 2),
            other => panic!("expected ambiguous kinds, got {other:?}"),
        }
        let gvk = idx.kind_for(&gr("events.k8s.io", "ev")).unwrap();
        assert_eq!(gvk.group, "events.k8s.io");
        let err = idx.kind_for(&gr("", "events")).unwrap_err();
        assert!(matches!(err, Error::AmbiguousResource { .. }));
    }

    #[test]
    fn real_name_beats_short_name() {
        let idx = index(vec![
            DiscoveryRecord::new("", "v1", "sc", "Scratch").preferred(),
            DiscoveryRecord::new("storage.k8s.io", "v1", "storageclasses", "StorageClass").short_names(&["sc"]).preferred(),
        ]);
        assert_eq!(idx.kind_for(&gr("", "sc")).unwrap().kind, "Scratch");
        assert_eq!(idx.kind_for(&gr("storage.k8s.io", "sc")).unwrap().kind, "StorageClass");
    }

    #[test]
    fn preferred_version_breaks_version_tie() {
        let idx = index(vec![
            DiscoveryRecord::new("autoscaling", "v2", "horizontalpodautoscalers", "HorizontalPodAutoscaler")
                .short_names(&["hpa"])
                .preferred(),
            DiscoveryRecord::new("autoscaling", "v1", "horizontalpodautoscalers", "HorizontalPodAutoscaler").short_names(&["hpa"]),
        ]);
        assert_eq!(idx.kind_for(&gr("", "hpa")).unwrap().version, "v2");
        assert_eq!(idx.kind_for(&GroupVersionResource::gvr("autoscaling", "v1", "hpa")).unwrap().version, "v1");
        assert_eq!(
            idx.versions_for(&GroupKind::gk("autoscaling", "HorizontalPodAutoscaler")),
            vec!["v2", "v1"]
        );
    }

    #[test]
    fn versions_without_preference_are_ambiguous() {
        let idx = index(vec![
            DiscoveryRecord::new("apps", "v1beta1", "widgets", "Widget"),
            DiscoveryRecord::new("apps", "v1", "widgets", "Widget"),
        ]);
        assert_eq!(
            idx.resolve_kind(&gr("apps", "widgets")),
            Resolution::Ambiguous(Ambiguity::Versions(vec!["v1beta1".into(), "v1".into()]))
        );
        let gk = GroupKind::gk("apps", "Widget");
        assert!(matches!(idx.rest_mapping(&gk, ""), Err(Error::AmbiguousVersion { .. })));
        assert_eq!(idx.rest_mapping(&gk, "v1").unwrap().resource.version, "v1");
    }

    #[test]
    fn two_preferred_versions_are_still_ambiguous() {
        let idx = index(vec![
            DiscoveryRecord::new("apps", "v1beta1", "widgets", "Widget").preferred(),
            DiscoveryRecord::new("apps", "v1", "widgets", "Widget").preferred(),
        ]);
        assert!(matches!(idx.resolve_kind(&gr("apps", "widgets")), Resolution::Ambiguous(Ambiguity::Versions(_))));
    }

    #[test]
    fn rest_mapping_reports_plural_and_scope() {
        let idx = index(vec![
            DiscoveryRecord::new("", "v1", "namespaces", "Namespace").short_names(&["ns"]).cluster_scoped().preferred(),
        ]);
        let m = idx.rest_mapping(&GroupKind::gk("", "Namespace"), "v1").unwrap();
        assert_eq!(m.resource, GroupVersionResource::gvr("", "v1", "namespaces"));
        assert_eq!(m.scope, Scope::Cluster);

        let err = idx.rest_mapping(&GroupKind::gk("", "Namespace"), "v2").unwrap_err();
        assert!(matches!(err, Error::NoKindMatch { .. }));
        let err = idx.rest_mapping(&GroupKind::gk("", "Nope"), "").unwrap_err();
        assert!(matches!(err, Error::NoKindMatch { .. }));
    }

    #[test]
    fn not_found_names_the_query() {
        let idx = index(vec![]);
        assert!(idx.is_empty());
        let err = idx.kind_for(&gr("", "flurbs")).unwrap_err();
        assert_eq!(err.to_string(), "the server doesn't have a resource type \"flurbs\"");
        let err = idx.kind_for(&GroupVersionResource::gvr("apps", "v1", "flurbs")).unwrap_err();
        assert!(err.to_string().contains("flurbs.v1.apps"));
    }
}
