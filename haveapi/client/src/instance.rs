//! Resource instances materialized from action output.
//!
//! Resource-typed output parameters are never fetched eagerly. The server
//! sends either a bare id, a stub object carrying `value_id`, `value_label`
//! and `_meta.url_params`, or, when the association was listed in the
//! request's `includes`, the full object with `_meta.resolved = true`. Only
//! the last becomes a resolved instance; the others stay an
//! [`AssociationStub`] until [`AssociationStub::show`] is called.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use haveapi_schema::{AssociationTarget, IoSpec, Params, ResourceReference, ResourcePath, VersionDescription};

use crate::client::Client;
use crate::error::ApiError;
use crate::graph::Resource;
use crate::response::{ActionResponse, Output};
use crate::url_template::placeholders;

/// One object returned by the API.
#[derive(Clone)]
pub struct ResourceInstance {
    client: Client,
    version: Arc<VersionDescription>,
    path: ResourcePath,
    url_params: Vec<Value>,
    attributes: Map<String, Value>,
    associations: BTreeMap<String, Association>,
    resolved: bool,
}

impl ResourceInstance {
    /// Builds an instance from an output object.
    ///
    /// `call_args` are the path arguments of the call that returned the
    /// object; they are used to derive url params when the server did not
    /// send any.
    pub(crate) fn materialize(
        client: &Client,
        version: &Arc<VersionDescription>,
        path: ResourcePath,
        output: Option<&IoSpec>,
        mut object: Map<String, Value>,
        call_args: &[Value],
    ) -> Self {
        let meta = match object.remove(&version.meta_namespace) {
            Some(Value::Object(meta)) => meta,
            _ => Map::new(),
        };

        let mut associations = BTreeMap::new();
        if let Some(output) = output {
            for (name, param) in &output.parameters {
                let Some(target) = &param.association else {
                    continue;
                };
                if let Some(value) = object.remove(name) {
                    if let Some(association) = Association::from_value(client, version, target, value) {
                        associations.insert(name.clone(), association);
                    }
                }
            }
        }

        let url_params = url_params_from_meta(&meta).unwrap_or_else(|| {
            derive_url_params(version, &path, call_args, object.get("id"))
        });
        let resolved = meta.get("resolved").and_then(Value::as_bool).unwrap_or(true);

        Self {
            client: client.clone(),
            version: Arc::clone(version),
            path,
            url_params,
            attributes: object,
            associations,
            resolved,
        }
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.path
    }

    /// Path arguments addressing this instance.
    pub fn url_params(&self) -> &[Value] {
        &self.url_params
    }

    /// Plain attributes. Associations are kept apart, see
    /// [`association`](Self::association).
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn id(&self) -> Option<&Value> {
        self.attributes.get("id")
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> &BTreeMap<String, Association> {
        &self.associations
    }

    /// A reference usable as input to a resource-typed parameter.
    pub fn reference(&self) -> Option<ResourceReference> {
        Some(ResourceReference {
            path: self.path.clone(),
            id: self.id()?.clone(),
        })
    }

    /// The resource with this instance's url params bound.
    pub fn resource(&self) -> Resource {
        Resource::new(
            self.client.clone(),
            Arc::clone(&self.version),
            self.path.clone(),
            self.url_params.clone(),
        )
    }

    /// Calls an action on this instance, e.g. `update` or `delete`.
    pub async fn call(&self, action: &str, params: impl Into<Params>) -> Result<ActionResponse, ApiError> {
        self.resource().call(action, params).await
    }

    /// Fetches the current state of this instance.
    pub async fn reload(&self) -> Result<ResourceInstance, ApiError> {
        fetch(&self.resource(), self.id()).await
    }
}

impl std::fmt::Debug for ResourceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceInstance")
            .field("path", &self.path)
            .field("url_params", &self.url_params)
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Value of a resource-typed output parameter.
#[derive(Debug, Clone)]
pub enum Association {
    Resolved(Box<ResourceInstance>),
    Unresolved(AssociationStub),
}

impl Association {
    fn from_value(
        client: &Client,
        version: &Arc<VersionDescription>,
        target: &AssociationTarget,
        value: Value,
    ) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(object) => {
                let meta = object.get(&version.meta_namespace).and_then(Value::as_object);
                let resolved = meta
                    .and_then(|m| m.get("resolved"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if resolved {
                    let output = version
                        .resource_at(&target.path)
                        .and_then(|r| r.show_action())
                        .and_then(|a| a.output.as_ref());
                    return Some(Self::Resolved(Box::new(ResourceInstance::materialize(
                        client,
                        version,
                        target.path.clone(),
                        output,
                        object,
                        &[],
                    ))));
                }

                let id = object.get(&target.value_id).cloned().unwrap_or(Value::Null);
                let url_params = meta
                    .and_then(url_params_from_meta)
                    .unwrap_or_else(|| derive_url_params(version, &target.path, &[], Some(&id)));
                Some(Self::Unresolved(AssociationStub {
                    client: client.clone(),
                    version: Arc::clone(version),
                    path: target.path.clone(),
                    label: object.get(&target.value_label).cloned(),
                    id,
                    url_params,
                }))
            }
            id => {
                let url_params = derive_url_params(version, &target.path, &[], Some(&id));
                Some(Self::Unresolved(AssociationStub {
                    client: client.clone(),
                    version: Arc::clone(version),
                    path: target.path.clone(),
                    id,
                    label: None,
                    url_params,
                }))
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Resolved(instance) => instance.id(),
            Self::Unresolved(stub) => Some(&stub.id),
        }
    }

    /// Returns the instance, fetching it if it was not resolved.
    pub async fn resolve(&self) -> Result<ResourceInstance, ApiError> {
        match self {
            Self::Resolved(instance) => Ok(instance.as_ref().clone()),
            Self::Unresolved(stub) => stub.show().await,
        }
    }
}

/// An association the server did not resolve.
#[derive(Clone)]
pub struct AssociationStub {
    client: Client,
    version: Arc<VersionDescription>,
    path: ResourcePath,
    id: Value,
    label: Option<Value>,
    url_params: Vec<Value>,
}

impl AssociationStub {
    /// Path of the associated resource.
    pub fn resource_path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn label(&self) -> Option<&Value> {
        self.label.as_ref()
    }

    pub fn url_params(&self) -> &[Value] {
        &self.url_params
    }

    /// Fetches the associated object.
    pub async fn show(&self) -> Result<ResourceInstance, ApiError> {
        let resource = Resource::new(
            self.client.clone(),
            Arc::clone(&self.version),
            self.path.clone(),
            self.url_params.clone(),
        );
        fetch(&resource, Some(&self.id)).await
    }
}

impl std::fmt::Debug for AssociationStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationStub")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("label", &self.label)
            .field("url_params", &self.url_params)
            .finish()
    }
}

/// Objects from a list output, plus the total count when it was asked for.
#[derive(Debug, Clone, Default)]
pub struct ResourceInstanceList {
    items: Vec<ResourceInstance>,
    total_count: Option<u64>,
}

impl ResourceInstanceList {
    pub(crate) fn new(items: Vec<ResourceInstance>, total_count: Option<u64>) -> Self {
        Self { items, total_count }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ResourceInstance> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceInstance> {
        self.items.iter()
    }

    /// Total number of matching objects, sent when the call asked for
    /// `count`.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn into_vec(self) -> Vec<ResourceInstance> {
        self.items
    }
}

impl IntoIterator for ResourceInstanceList {
    type Item = ResourceInstance;
    type IntoIter = std::vec::IntoIter<ResourceInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceInstanceList {
    type Item = &'a ResourceInstance;
    type IntoIter = std::slice::Iter<'a, ResourceInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Calls the resource's `show` action, or `index` when there is none, and
/// picks out the object with the given id.
async fn fetch(resource: &Resource, id: Option<&Value>) -> Result<ResourceInstance, ApiError> {
    let show = resource
        .descriptor()?
        .show_action()
        .map(|a| a.name.clone())
        .ok_or_else(|| ApiError::not_found(resource.path().join("show")))?;

    match resource.call(&show, Params::new()).await?.output()? {
        Output::Object(instance) => Ok(instance),
        Output::ObjectList(list) => list
            .into_iter()
            .find(|item| item.id().is_some() && item.id() == id)
            .ok_or_else(|| ApiError::not_found(resource.path())),
        other => Err(other.unexpected("object")),
    }
}

fn url_params_from_meta(meta: &Map<String, Value>) -> Option<Vec<Value>> {
    meta.get("url_params").and_then(Value::as_array).cloned()
}

/// Url params of an object the server sent without any: the leading call
/// arguments addressing the parent resources, then the object's id. Singular
/// resources take no id, and neither do resources that can only be listed,
/// since their index URL has no slot for one.
fn derive_url_params(
    version: &VersionDescription,
    path: &ResourcePath,
    call_args: &[Value],
    id: Option<&Value>,
) -> Vec<Value> {
    let Some(resource) = version.resource_at(path) else {
        return call_args.to_vec();
    };
    let Some(show) = resource.show_action() else {
        return call_args.to_vec();
    };
    let needed = placeholders(&show.url).len();
    let addressable = resource.action("show").is_some() && !resource.is_singular();

    match id {
        Some(id) if addressable && needed > 0 => {
            let mut params: Vec<Value> = call_args.iter().take(needed - 1).cloned().collect();
            params.push(id.clone());
            params
        }
        _ => call_args.iter().take(needed).cloned().collect(),
    }
}
