//! Parsed API description documents.
//!
//! A [`SchemaDescription`] holds one or more [`VersionDescription`]s. Each
//! version is checked once, on construction: every resource-typed parameter
//! must point at an existing resource that can be shown. After that the
//! description is immutable and shared behind an `Arc`.

mod action;
mod auth;
mod parameter;
mod resource;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

pub use action::{ActionDescriptor, IoSpec, Layout};
pub use auth::{AuthMethods, BasicDescription, OAuth2Description, TokenDescription};
pub use parameter::{AssociationTarget, ParameterDescriptor, ParameterType};
pub use resource::{placeholder_count, NodeRef, ResourceDescriptor};

use crate::error::SchemaError;
use crate::path::ResourcePath;

/// Default envelope key for request and response meta data.
pub const DEFAULT_META_NAMESPACE: &str = "_meta";

/// Description of a single API version.
#[derive(Debug, Clone)]
pub struct VersionDescription {
    root: ResourceDescriptor,
    pub authentication: AuthMethods,
    /// Envelope key under which meta parameters travel.
    pub meta_namespace: String,
    pub help: Option<String>,
}

#[derive(Deserialize)]
struct RawVersion {
    #[serde(default)]
    authentication: AuthMethods,
    #[serde(default, deserialize_with = "resource::named_resources")]
    resources: BTreeMap<String, ResourceDescriptor>,
    #[serde(default)]
    meta: Option<RawMeta>,
    #[serde(default)]
    help: Option<String>,
}

#[derive(Deserialize)]
struct RawMeta {
    namespace: Option<String>,
}

impl VersionDescription {
    /// Parses and checks a version document.
    ///
    /// ## Errors
    ///
    /// Returns [`SchemaError::Malformed`] if the document does not match the
    /// expected structure and [`SchemaError::UnresolvedAssociation`] if a
    /// resource parameter points nowhere.
    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        let raw: RawVersion = serde_json::from_value(document)?;
        Self::new(
            ResourceDescriptor::new("", [], raw.resources.into_values()),
            raw.authentication,
            raw.meta
                .and_then(|m| m.namespace)
                .unwrap_or_else(|| DEFAULT_META_NAMESPACE.to_string()),
            raw.help,
        )
    }

    /// Builds a version from already parsed parts and checks associations.
    pub fn new(
        root: ResourceDescriptor,
        authentication: AuthMethods,
        meta_namespace: String,
        help: Option<String>,
    ) -> Result<Self, SchemaError> {
        let version = Self {
            root,
            authentication,
            meta_namespace,
            help,
        };
        version.check_associations()?;
        Ok(version)
    }

    /// Top-level resources keyed by name.
    pub fn resources(&self) -> &BTreeMap<String, ResourceDescriptor> {
        &self.root.resources
    }

    /// The unnamed root resource whose children are the top-level resources.
    pub fn root(&self) -> &ResourceDescriptor {
        &self.root
    }

    /// Finds a resource by path.
    pub fn resource_at(&self, path: &ResourcePath) -> Option<&ResourceDescriptor> {
        path.segments()
            .iter()
            .try_fold(&self.root, |resource, segment| resource.resource(segment))
    }

    /// Finds an action by resource path and action name or alias.
    pub fn action_at(&self, path: &ResourcePath, action: &str) -> Option<&ActionDescriptor> {
        self.resource_at(path)?.action(action)
    }

    /// Returns `true` if this version declares the authentication method.
    pub fn supports_auth(&self, method: &str) -> bool {
        self.authentication.declares(method)
    }

    fn check_associations(&self) -> Result<(), SchemaError> {
        let mut pending = vec![(ResourcePath::root(), &self.root)];
        while let Some((path, resource)) = pending.pop() {
            for action in resource.actions.values() {
                let params = action.input_parameters().chain(action.output_parameters());
                for (name, param) in params {
                    let Some(target) = &param.association else {
                        continue;
                    };
                    let resolvable = self
                        .resource_at(&target.path)
                        .is_some_and(|r| r.show_action().is_some());
                    if !resolvable {
                        return Err(SchemaError::UnresolvedAssociation {
                            action: path.join(action.name.clone()).to_string(),
                            parameter: name.clone(),
                            target: target.path.to_string(),
                        });
                    }
                }
            }
            for (name, child) in &resource.resources {
                pending.push((path.join(name.clone()), child));
            }
        }
        Ok(())
    }
}

/// The full description: every fetched version plus the default.
#[derive(Debug, Clone)]
pub struct SchemaDescription {
    default_version: String,
    versions: BTreeMap<String, Arc<VersionDescription>>,
}

#[derive(Deserialize)]
struct RawRoot {
    default_version: Value,
    versions: BTreeMap<String, Value>,
}

impl SchemaDescription {
    /// Parses the root document listing every version.
    ///
    /// The server repeats the default version under the key `"default"`;
    /// that duplicate is skipped.
    pub fn from_root_document(document: Value) -> Result<Self, SchemaError> {
        let raw: RawRoot = serde_json::from_value(document)?;
        let default_version = version_key(&raw.default_version);

        let mut versions = BTreeMap::new();
        for (key, doc) in raw.versions {
            if key == "default" {
                continue;
            }
            versions.insert(key, Arc::new(VersionDescription::from_value(doc)?));
        }

        if !versions.contains_key(&default_version) {
            return Err(SchemaError::UnknownVersion {
                version: default_version,
            });
        }

        Ok(Self {
            default_version,
            versions,
        })
    }

    /// Wraps a single version document, which then is the default.
    pub fn from_version_document(
        version: impl Into<String>,
        document: Value,
    ) -> Result<Self, SchemaError> {
        Ok(Self::single(version, VersionDescription::from_value(document)?))
    }

    /// Wraps an already built version.
    pub fn single(version: impl Into<String>, description: VersionDescription) -> Self {
        let version = version.into();
        Self {
            default_version: version.clone(),
            versions: BTreeMap::from([(version, Arc::new(description))]),
        }
    }

    /// Name of the default version.
    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Names of every version held.
    pub fn version_names(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// The default version's description.
    pub fn default_description(&self) -> Arc<VersionDescription> {
        // Construction guarantees the default version is present.
        Arc::clone(&self.versions[&self.default_version])
    }

    /// A specific version's description.
    pub fn version(&self, version: &str) -> Result<Arc<VersionDescription>, SchemaError> {
        self.versions
            .get(version)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownVersion {
                version: version.to_string(),
            })
    }
}

/// Renders a version identifier that may arrive as a number or a string.
pub fn version_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version_doc() -> Value {
        json!({
            "authentication": {"basic": {"description": "HTTP basic"}},
            "meta": {"namespace": "_meta"},
            "resources": {
                "project": {
                    "actions": {
                        "show": {
                            "method": "GET",
                            "url": "/v1/projects/{project_id}",
                            "output": {
                                "layout": "object",
                                "namespace": "project",
                                "parameters": {
                                    "id": {"type": "Integer"},
                                    "owner": {"type": "Resource", "resource": ["user"]}
                                }
                            }
                        }
                    },
                    "resources": {
                        "task": {
                            "actions": {
                                "index": {"method": "GET", "url": "/v1/projects/{project_id}/tasks"}
                            }
                        }
                    }
                },
                "user": {
                    "actions": {
                        "show": {"method": "GET", "url": "/v1/users/{user_id}"}
                    }
                }
            }
        })
    }

    #[test]
    fn test_version_from_value() {
        let version = VersionDescription::from_value(version_doc()).unwrap();
        assert_eq!(version.meta_namespace, "_meta");
        assert!(version.supports_auth("basic"));
        assert!(!version.supports_auth("token"));
        assert_eq!(version.resources().len(), 2);
        assert_eq!(version.resources()["project"].name, "project");
    }

    #[test]
    fn test_resource_at_nested_path() {
        let version = VersionDescription::from_value(version_doc()).unwrap();
        let task = version.resource_at(&ResourcePath::from("project.task")).unwrap();
        assert_eq!(task.name, "task");
        assert!(version.resource_at(&ResourcePath::from("project.missing")).is_none());
        assert!(version
            .action_at(&ResourcePath::from("project.task"), "index")
            .is_some());
    }

    #[test]
    fn test_meta_namespace_defaults() {
        let version = VersionDescription::from_value(json!({"resources": {}})).unwrap();
        assert_eq!(version.meta_namespace, DEFAULT_META_NAMESPACE);
    }

    #[test]
    fn test_unresolvable_association_fails_construction() {
        let mut doc = version_doc();
        doc["resources"]
            .as_object_mut()
            .unwrap()
            .remove("user");

        let err = VersionDescription::from_value(doc).unwrap_err();
        match err {
            SchemaError::UnresolvedAssociation {
                action,
                parameter,
                target,
            } => {
                assert_eq!(action, "project.show");
                assert_eq!(parameter, "owner");
                assert_eq!(target, "user");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_format_pattern_keeps_description() {
        let mut doc = version_doc();
        doc["resources"]["user"]["actions"]["create"] = json!({
            "method": "POST",
            "url": "/v1/users",
            "input": {
                "layout": "object",
                "namespace": "user",
                "parameters": {
                    "login": {
                        "type": "String",
                        "validators": {
                            "format": {"rx": "\\A(?!root)[a-z]+\\z", "match": true},
                            "length": {"min": 2}
                        }
                    }
                }
            }
        });

        let version = VersionDescription::from_value(doc).unwrap();
        let create = version.action_at(&ResourcePath::from("user"), "create").unwrap();
        let login = create.input.as_ref().unwrap().parameter("login").unwrap();
        assert!(login.validators.get("format").is_none());
        assert!(login.validators.get("length").is_some());
    }

    #[test]
    fn test_association_target_without_show_fails() {
        let mut doc = version_doc();
        doc["resources"]["user"] = json!({
            "actions": {"create": {"method": "POST", "url": "/v1/users"}}
        });
        assert!(matches!(
            VersionDescription::from_value(doc),
            Err(SchemaError::UnresolvedAssociation { .. })
        ));
    }

    #[test]
    fn test_root_document() {
        let doc = json!({
            "default_version": 1,
            "versions": {
                "1": version_doc(),
                "default": version_doc()
            }
        });
        let schema = SchemaDescription::from_root_document(doc).unwrap();
        assert_eq!(schema.default_version(), "1");
        assert_eq!(schema.version_names().collect::<Vec<_>>(), ["1"]);
        assert!(schema.default_description().resources().contains_key("user"));
        assert!(matches!(
            schema.version("2"),
            Err(SchemaError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn test_root_document_missing_default() {
        let doc = json!({"default_version": "3", "versions": {"1": version_doc()}});
        assert!(matches!(
            SchemaDescription::from_root_document(doc),
            Err(SchemaError::UnknownVersion { version }) if version == "3"
        ));
    }

    #[test]
    fn test_malformed_document() {
        let err = VersionDescription::from_value(json!({"resources": []})).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }
}
