//! resref kubehub: discovery sources and the process-lifetime discovery cache

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use futures::future::try_join_all;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroupList, APIResourceList, APIVersions};
use kube::{config::KubeConfigOptions, Client, Config};
use resref_core::DiscoveryRecord;
use tracing::debug;

mod cache;

pub use cache::{DiscoveryCache, DEFAULT_FETCH_TIMEOUT};

/// Anything that can list the resources a cluster currently serves.
///
/// Implementations are expected to be slow and fallible; callers go through
/// [`DiscoveryCache`] rather than hitting a source per lookup.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync {
    /// All served resources in discovery priority order: groups in server
    /// order (core first), versions within a group in declared priority order.
    async fn fetch(&self) -> Result<Vec<DiscoveryRecord>>;
}

/// Fixed record set, for tests and offline catalogs.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    records: Vec<DiscoveryRecord>,
}

impl StaticDiscovery {
    pub fn new(records: Vec<DiscoveryRecord>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn fetch(&self) -> Result<Vec<DiscoveryRecord>> {
        Ok(self.records.clone())
    }
}

/// Discovery against a live API server.
#[derive(Clone)]
pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the kubeconfig `context`, or infer one (current context / in-cluster).
    pub async fn for_context(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(ctx) => {
                let opts = KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
                Config::from_kubeconfig(&opts)
                    .await
                    .with_context(|| format!("loading kubeconfig context {}", ctx))?
            }
            None => Config::infer().await.context("inferring kube config")?,
        };
        let client = Client::try_from(config).context("building kube client")?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl DiscoverySource for KubeDiscovery {
    async fn fetch(&self) -> Result<Vec<DiscoveryRecord>> {
        let core = self.client.list_core_api_versions().await.context("listing core api versions")?;
        let groups = self.client.list_api_groups().await.context("listing api groups")?;

        let targets = targets(&core, groups);
        debug!(group_versions = targets.len(), "listing resources per group version");

        let client = &self.client;
        let lists = try_join_all(targets.iter().map(|t| async move {
            let list = if t.group.is_empty() {
                client.list_core_api_resources(&t.group_version).await
            } else {
                client.list_api_group_resources(&t.group_version).await
            };
            list.with_context(|| format!("listing resources for {}", t.group_version))
        }))
        .await?;

        let mut out = Vec::new();
        for (t, list) in targets.iter().zip(lists.iter()) {
            push_records(&mut out, &t.group, &t.version, t.preferred, list);
        }
        Ok(out)
    }
}

#[derive(Debug)]
struct Target {
    group: String,
    version: String,
    preferred: bool,
    group_version: String,
}

/// Group versions to list, in server order. Core's first version counts as preferred;
/// a group's version is preferred when it matches the group's `preferredVersion`.
fn targets(core: &APIVersions, groups: APIGroupList) -> Vec<Target> {
    let mut out = Vec::new();
    for (i, v) in core.versions.iter().enumerate() {
        out.push(Target { group: String::new(), version: v.clone(), preferred: i == 0, group_version: v.clone() });
    }
    for g in groups.groups {
        let preferred = g.preferred_version.as_ref().map(|p| p.version.clone());
        for gv in g.versions {
            let is_preferred = preferred.as_deref() == Some(gv.version.as_str());
            out.push(Target {
                group: g.name.clone(),
                version: gv.version,
                preferred: is_preferred,
                group_version: gv.group_version,
            });
        }
    }
    out
}

/// Flatten one group version's resource list, skipping subresources like `pods/log`.
fn push_records(out: &mut Vec<DiscoveryRecord>, group: &str, version: &str, preferred: bool, list: &APIResourceList) {
    for res in &list.resources {
        if res.name.contains('/') {
            continue;
        }
        out.push(DiscoveryRecord {
            group: group.to_string(),
            version: version.to_string(),
            resource: res.name.clone(),
            singular: res.singular_name.clone(),
            kind: res.kind.clone(),
            short_names: res.short_names.iter().flatten().cloned().collect(),
            namespaced: res.namespaced,
            preferred,
        });
    }
}
