use crate::{GroupResource, GroupVersionResource};

/// Split a `resource[.version[.group]]` argument.
///
/// - `pods` yields `gr = {"", pods}` and no GVR
/// - `deployments.apps` yields `gr = {apps, deployments}` and no GVR; the
///   second segment is always read as a group, never a version
/// - `deployments.v1.apps` yields `gvr = {apps, v1, deployments}` plus the
///   fallback `gr = {v1.apps, deployments}` for groups that contain dots
pub fn parse_resource_arg(arg: &str) -> (Option<GroupVersionResource>, GroupResource) {
    let gr = match arg.split_once('.') {
        Some((resource, group)) => GroupResource::gr(group, resource),
        None => GroupResource::gr("", arg),
    };
    let mut parts = arg.splitn(3, '.');
    let gvr = match (parts.next(), parts.next(), parts.next()) {
        (Some(resource), Some(version), Some(group)) => Some(GroupVersionResource::gvr(group, version, resource)),
        _ => None,
    };
    (gvr, gr)
}
