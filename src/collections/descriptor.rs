//! Collection manifests and descriptors.
//!
//! # Responsibilities
//! - Parse a `collection.json` manifest
//! - Derive and validate the collection name
//! - Resolve the logic module path relative to the manifest
//!
//! # Design Decisions
//! - Descriptors are immutable; a changed manifest produces a new descriptor
//! - Endpoint overrides keep the author's declaration order

use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Manifest filename the defaults and the watcher refer to.
pub const MANIFEST_FILENAME: &str = "collection.json";

/// Errors raised while turning a manifest file into a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read manifest {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("collection name \"{name}\" is incorrect (letters, digits, '-' and '_' only)")]
    InvalidName { name: String },

    #[error("endpoint \"{key}\" in {path:?} must map to a handle name or false")]
    InvalidEndpoint { path: PathBuf, key: String },
}

/// A single entry of a manifest's `endpoints` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOverride {
    /// `"get /": "list"`
    Handle(String),
    /// `"delete /:id": false`
    Disabled,
}

/// Raw manifest as authored.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    logic: Option<String>,
    endpoints: Option<Map<String, Value>>,
    #[serde(rename = "endpointsDefault")]
    endpoints_default: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Validated manifest properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    /// Logic module path, relative to the manifest's directory.
    pub logic: String,
    /// Endpoint overrides in declaration order.
    pub endpoints: Vec<(String, EndpointOverride)>,
    /// Whether the conventional CRUD endpoints are included.
    pub endpoints_default: bool,
    /// Any other manifest keys.
    pub extra: Map<String, Value>,
}

/// Parsed, validated manifest data for a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub manifest_path: PathBuf,
    pub directory: PathBuf,
    pub logic_path: PathBuf,
    pub properties: Properties,
}

impl Descriptor {
    /// Read and parse the manifest at `manifest_path`.
    pub fn from_manifest(manifest_path: &Path, default_logic: &str) -> Result<Self, DescriptorError> {
        let content = fs::read_to_string(manifest_path).map_err(|source| DescriptorError::Io {
            path: manifest_path.to_path_buf(),
            source,
        })?;
        Self::parse(manifest_path, &content, default_logic)
    }

    /// Build a descriptor from manifest text located at `manifest_path`.
    pub fn parse(manifest_path: &Path, content: &str, default_logic: &str) -> Result<Self, DescriptorError> {
        let raw: RawManifest = serde_json::from_str(content).map_err(|source| DescriptorError::Parse {
            path: manifest_path.to_path_buf(),
            source,
        })?;

        let directory = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let name = raw
            .name
            .clone()
            .unwrap_or_else(|| {
                directory
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .to_lowercase();

        if !is_valid_name(&name) {
            return Err(DescriptorError::InvalidName { name });
        }

        let mut endpoints = Vec::new();
        for (key, value) in raw.endpoints.unwrap_or_default() {
            let entry = match value {
                Value::String(handle) => EndpointOverride::Handle(handle),
                Value::Bool(false) => EndpointOverride::Disabled,
                _ => {
                    return Err(DescriptorError::InvalidEndpoint {
                        path: manifest_path.to_path_buf(),
                        key,
                    })
                }
            };
            endpoints.push((key, entry));
        }

        let logic = raw.logic.unwrap_or_else(|| default_logic.to_string());
        let logic_path = normalize(&directory.join(&logic));

        Ok(Self {
            name,
            manifest_path: manifest_path.to_path_buf(),
            directory,
            logic_path,
            properties: Properties {
                logic,
                endpoints,
                endpoints_default: raw.endpoints_default.unwrap_or(true),
                extra: raw.extra,
            },
        })
    }
}

/// Collection names are non-empty runs of letters, digits, `-` and `_`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Lexically normalize `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
