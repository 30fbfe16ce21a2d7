use thiserror::Error;

use crate::{GroupKind, GroupVersionKind};

/// Resolution failures. Every variant names what was being resolved.
#[derive(Debug, Error)]
pub enum Error {
    #[error("discovery unavailable: {0:#}")]
    DiscoveryUnavailable(#[source] anyhow::Error),

    #[error("the server doesn't have a resource type \"{resource}\"")]
    NoResourceMatch { resource: String },

    #[error("resource \"{resource}\" is served at multiple versions {versions:?} with no preferred version; specify one")]
    AmbiguousVersion { resource: String, versions: Vec<String> },

    #[error("resource \"{resource}\" matches multiple kinds: {}", join_gvks(.candidates))]
    AmbiguousResource { resource: String, candidates: Vec<GroupVersionKind> },

    #[error("no matches for kind \"{group_kind}\" in version \"{version}\"")]
    NoKindMatch { group_kind: GroupKind, version: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_gvks(gvks: &[GroupVersionKind]) -> String {
    gvks.iter().map(|g| format!("{}/{}", g.api_version(), g.kind)).collect::<Vec<_>>().join(", ")
}
