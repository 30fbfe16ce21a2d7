//! Output forms for a resolved mapping.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::ObjectReference;
use clap::ValueEnum;
use resref_core::RestMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `apiVersion`/`kind`/`name` object reference as YAML
    Yaml,
    /// `<resource>[.<group>] <name>`
    Line,
}

pub fn object_reference(mapping: &RestMapping, name: &str) -> ObjectReference {
    ObjectReference {
        name: Some(name.to_string()),
        kind: Some(mapping.group_version_kind.kind.clone()),
        api_version: Some(mapping.group_version_kind.api_version()),
        ..Default::default()
    }
}

pub fn line(mapping: &RestMapping, name: &str) -> String {
    format!("{} {}", mapping.resource.group_resource(), name)
}

pub fn render(mapping: &RestMapping, name: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(&object_reference(mapping, name)).context("marshal object reference"),
        OutputFormat::Line => Ok(line(mapping, name)),
    }
}
