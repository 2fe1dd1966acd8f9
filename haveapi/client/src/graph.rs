//! Navigable resource and action graph.
//!
//! Nodes are cheap handles: a client, the description snapshot they were
//! resolved against, a resource path and the positional path arguments
//! gathered so far. Arguments given at each hop accumulate in order and are
//! bound to the action's URL placeholders when it is called.

use std::sync::Arc;

use serde_json::{Map, Value};

use haveapi_schema::{ActionDescriptor, NodeRef, Params, ResourceDescriptor, ResourcePath, VersionDescription};

use crate::client::Client;
use crate::error::ApiError;
use crate::request::build_request;
use crate::response::ActionResponse;

/// What a name resolved to.
#[derive(Debug, Clone)]
pub enum Node {
    Resource(Resource),
    Action(Action),
}

impl Node {
    pub fn into_resource(self) -> Result<Resource, ApiError> {
        match self {
            Self::Resource(resource) => Ok(resource),
            Self::Action(action) => Err(ApiError::not_found(format!("resource {}", action.path()))),
        }
    }

    pub fn into_action(self) -> Result<Action, ApiError> {
        match self {
            Self::Action(action) => Ok(action),
            Self::Resource(resource) => Err(ApiError::not_found(format!("action {}", resource.path()))),
        }
    }
}

/// A resource, possibly with path arguments bound.
#[derive(Clone)]
pub struct Resource {
    client: Client,
    version: Arc<VersionDescription>,
    path: ResourcePath,
    args: Vec<Value>,
}

impl Resource {
    pub(crate) fn new(
        client: Client,
        version: Arc<VersionDescription>,
        path: ResourcePath,
        args: Vec<Value>,
    ) -> Self {
        Self {
            client,
            version,
            path,
            args,
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Path arguments bound so far.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn descriptor(&self) -> Result<&ResourceDescriptor, ApiError> {
        self.version
            .resource_at(&self.path)
            .ok_or_else(|| ApiError::not_found(&self.path))
    }

    /// Appends path arguments.
    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends one path argument.
    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Resolves a nested resource or an action by name or alias. A nested
    /// resource wins over an action of the same name.
    pub fn resolve(&self, name: &str) -> Result<Node, ApiError> {
        match self.descriptor()?.lookup(name) {
            Some(NodeRef::Resource(resource)) => Ok(Node::Resource(self.child(&resource.name))),
            Some(NodeRef::Action(action)) => Ok(Node::Action(self.bind_action(action))),
            None => Err(ApiError::not_found(self.path.join(name))),
        }
    }

    pub fn resource(&self, name: &str) -> Result<Resource, ApiError> {
        let descriptor = self.descriptor()?;
        match descriptor.resource(name) {
            Some(resource) => Ok(self.child(&resource.name)),
            None => Err(ApiError::not_found(self.path.join(name))),
        }
    }

    pub fn action(&self, name: &str) -> Result<Action, ApiError> {
        match self.descriptor()?.action(name) {
            Some(action) => Ok(self.bind_action(action)),
            None => Err(ApiError::not_found(self.path.join(name))),
        }
    }

    /// Names of nested resources.
    pub fn resource_names(&self) -> Vec<String> {
        self.descriptor()
            .map(|d| d.resources.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of this resource's actions, without aliases.
    pub fn action_names(&self) -> Vec<String> {
        self.descriptor()
            .map(|d| d.actions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Calls an action of this resource with the arguments bound so far.
    pub async fn call(&self, action: &str, params: impl Into<Params>) -> Result<ActionResponse, ApiError> {
        self.action(action)?.call(params).await
    }

    fn child(&self, name: &str) -> Resource {
        Resource {
            client: self.client.clone(),
            version: Arc::clone(&self.version),
            path: self.path.join(name),
            args: self.args.clone(),
        }
    }

    fn bind_action(&self, action: &ActionDescriptor) -> Action {
        Action {
            client: self.client.clone(),
            version: Arc::clone(&self.version),
            resource: self.path.clone(),
            descriptor: action.clone(),
            args: self.args.clone(),
            meta: Map::new(),
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// An action ready to be called.
#[derive(Clone)]
pub struct Action {
    client: Client,
    version: Arc<VersionDescription>,
    resource: ResourcePath,
    descriptor: ActionDescriptor,
    args: Vec<Value>,
    meta: Map<String, Value>,
}

impl Action {
    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Path of the resource the action belongs to.
    pub fn resource_path(&self) -> &ResourcePath {
        &self.resource
    }

    /// Dotted path, e.g. `project.task.create`.
    pub fn path(&self) -> String {
        self.resource.join(&self.descriptor.name).to_string()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets a request meta parameter.
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(name.into(), value.into());
        self
    }

    /// Asks the server to resolve the named associations in the reply.
    /// Nested associations use `__`, e.g. `project__owner`.
    pub fn includes<I, S>(self, associations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list: Vec<String> = associations.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.meta("includes", list.join(","))
    }

    /// Asks for the total number of objects along with a list.
    pub fn count(self) -> Self {
        self.meta("count", true)
    }

    /// Asks the server not to return any objects, e.g. together with
    /// [`count`](Self::count).
    pub fn no(self) -> Self {
        self.meta("no", true)
    }

    /// Calls the action with the arguments bound so far.
    ///
    /// ## Errors
    ///
    /// Local errors ([`ApiError::UnresolvedArguments`],
    /// [`ApiError::Validation`]) are raised before anything is sent.
    pub async fn call(&self, params: impl Into<Params>) -> Result<ActionResponse, ApiError> {
        self.invoke(self.args.clone(), params.into()).await
    }

    /// Calls the action with extra call-site path arguments.
    pub async fn call_with<I, V>(&self, args: I, params: impl Into<Params>) -> Result<ActionResponse, ApiError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut all = self.args.clone();
        all.extend(args.into_iter().map(Into::into));
        self.invoke(all, params.into()).await
    }

    async fn invoke(&self, args: Vec<Value>, params: Params) -> Result<ActionResponse, ApiError> {
        let request = build_request(
            &self.version,
            &self.descriptor,
            &self.path(),
            &args,
            &params,
            &self.meta,
        )?;
        let envelope = self.client.execute(&self.version, request).await?;
        Ok(ActionResponse::new(
            self.client.clone(),
            Arc::clone(&self.version),
            self.resource.clone(),
            self.descriptor.clone(),
            args,
            envelope,
        ))
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("path", &self.path())
            .field("method", &self.descriptor.http_method)
            .field("url", &self.descriptor.url)
            .field("args", &self.args)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
