//! resref core types: group/version/kind/resource identifiers, discovery records, REST mappings.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

mod error;
mod parse;

pub use error::{Error, Result};
pub use parse::parse_resource_arg;

/// Render `group/version`, or just `version` for the core group.
fn api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}

/// A resource collection at a specific version, e.g. `apps/v1 deployments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn gvr(group: &str, version: &str, resource: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), resource: resource.to_string() }
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource { group: self.group.clone(), resource: self.resource.clone() }
    }

    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Resource={}", self.api_version(), self.resource)
    }
}

/// A resource collection without a version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn gr(group: &str, resource: &str) -> Self {
        Self { group: group.to_string(), resource: resource.to_string() }
    }

    pub fn with_version(&self, version: &str) -> GroupVersionResource {
        GroupVersionResource::gvr(&self.group, version, &self.resource)
    }
}

/// Canonical `resource.group` form; bare `resource` for the core group.
impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn gvk(group: &str, version: &str, kind: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind { group: self.group.clone(), kind: self.kind.clone() }
    }

    /// The `apiVersion` string used in an object's manifest.
    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn gk(group: &str, kind: &str) -> Self {
        Self { group: group.to_string(), kind: kind.to_string() }
    }

    pub fn with_version(&self, version: &str) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, version, &self.kind)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl Scope {
    pub fn from_namespaced(namespaced: bool) -> Self {
        if namespaced {
            Scope::Namespaced
        } else {
            Scope::Cluster
        }
    }
}

/// Fully resolved answer: the collection endpoint plus the object's kind and scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestMapping {
    pub resource: GroupVersionResource,
    pub group_version_kind: GroupVersionKind,
    pub scope: Scope,
}

/// One served resource at one version, as reported by discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `pods`
    pub resource: String,
    /// Singular resource name; empty when discovery did not publish one
    #[serde(default)]
    pub singular: String,
    pub kind: String,
    #[serde(default)]
    pub short_names: SmallVec<[String; 2]>,
    pub namespaced: bool,
    /// Whether `version` is the group's declared preferred version
    #[serde(default)]
    pub preferred: bool,
}

impl DiscoveryRecord {
    pub fn new(group: &str, version: &str, resource: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            singular: String::new(),
            kind: kind.to_string(),
            short_names: SmallVec::new(),
            namespaced: true,
            preferred: false,
        }
    }

    pub fn short_names(mut self, names: &[&str]) -> Self {
        self.short_names = names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn cluster_scoped(mut self) -> Self {
        self.namespaced = false;
        self
    }

    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    /// Singular name, falling back to the lowercased kind.
    pub fn singular_name(&self) -> String {
        if self.singular.is_empty() {
            self.kind.to_lowercase()
        } else {
            self.singular.to_lowercase()
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    pub fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource::gvr(&self.group, &self.version, &self.resource)
    }

    pub fn scope(&self) -> Scope {
        Scope::from_namespaced(self.namespaced)
    }
}
