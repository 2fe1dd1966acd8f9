//! Successful action replies and their typed output.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use haveapi_schema::{ActionDescriptor, Layout, ResourcePath, VersionDescription};

use crate::action_state::{ActionStateWaiter, WaitOutcome};
use crate::client::Client;
use crate::envelope::Envelope;
use crate::error::{ApiError, ProtocolError};
use crate::instance::{ResourceInstance, ResourceInstanceList};

/// Action output shaped by the action's declared layout.
#[derive(Debug, Clone)]
pub enum Output {
    Object(ResourceInstance),
    ObjectList(ResourceInstanceList),
    Hash(Map<String, Value>),
    HashList(Vec<Map<String, Value>>),
    Custom(Value),
    /// The action declares no output, or the server sent none.
    Empty,
}

impl Output {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::ObjectList(_) => "object_list",
            Self::Hash(_) => "hash",
            Self::HashList(_) => "hash_list",
            Self::Custom(_) => "custom",
            Self::Empty => "nothing",
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ApiError {
        ProtocolError::UnexpectedOutput {
            expected: expected.to_string(),
            actual: self.kind().to_string(),
        }
        .into()
    }
}

/// Reply to a successful action call.
#[derive(Clone)]
pub struct ActionResponse {
    client: Client,
    version: Arc<VersionDescription>,
    resource: ResourcePath,
    action: ActionDescriptor,
    args: Vec<Value>,
    envelope: Envelope,
}

impl ActionResponse {
    pub(crate) fn new(
        client: Client,
        version: Arc<VersionDescription>,
        resource: ResourcePath,
        action: ActionDescriptor,
        args: Vec<Value>,
        envelope: Envelope,
    ) -> Self {
        Self {
            client,
            version,
            resource,
            action,
            args,
            envelope,
        }
    }

    pub fn action(&self) -> &ActionDescriptor {
        &self.action
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.resource
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn message(&self) -> Option<&str> {
        self.envelope.message.as_deref()
    }

    /// The output namespace's value, or the whole response when the output
    /// has no namespace.
    pub fn payload(&self) -> Option<&Value> {
        match self.action.output.as_ref().map(|io| io.namespace.as_str()) {
            Some(namespace) if !namespace.is_empty() => self.envelope.response.get(namespace),
            _ => Some(&self.envelope.response),
        }
    }

    /// Response meta data.
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.envelope.meta(&self.version.meta_namespace)
    }

    pub fn total_count(&self) -> Option<u64> {
        self.meta()?.get("total_count")?.as_u64()
    }

    /// Id of the action state tracking a blocking action.
    pub fn action_state_id(&self) -> Option<i64> {
        self.meta()?.get("action_state_id")?.as_i64()
    }

    pub fn is_blocking(&self) -> bool {
        self.action.blocking
    }

    /// Interprets the payload according to the output layout.
    ///
    /// ## Errors
    ///
    /// Returns [`ProtocolError::UnexpectedOutput`] when the payload does not
    /// have the declared shape.
    pub fn output(&self) -> Result<Output, ApiError> {
        let Some(io) = &self.action.output else {
            return Ok(Output::Empty);
        };
        let payload = match self.payload() {
            None | Some(Value::Null) => return Ok(Output::Empty),
            Some(payload) => payload,
        };

        match io.layout {
            Layout::Object => {
                let object = as_object(payload, "object")?;
                Ok(Output::Object(ResourceInstance::materialize(
                    &self.client,
                    &self.version,
                    self.resource.clone(),
                    Some(io),
                    object.clone(),
                    &self.args,
                )))
            }
            Layout::ObjectList => {
                let items = as_array(payload, "object_list")?
                    .iter()
                    .map(|item| {
                        as_object(item, "object_list").map(|object| {
                            ResourceInstance::materialize(
                                &self.client,
                                &self.version,
                                self.resource.clone(),
                                Some(io),
                                object.clone(),
                                &self.args,
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Output::ObjectList(ResourceInstanceList::new(
                    items,
                    self.total_count(),
                )))
            }
            Layout::Hash => Ok(Output::Hash(as_object(payload, "hash")?.clone())),
            Layout::HashList => Ok(Output::HashList(
                as_array(payload, "hash_list")?
                    .iter()
                    .map(|item| as_object(item, "hash_list").cloned())
                    .collect::<Result<_, _>>()?,
            )),
            Layout::Custom => Ok(Output::Custom(payload.clone())),
        }
    }

    /// The output as a single instance.
    pub fn into_instance(self) -> Result<ResourceInstance, ApiError> {
        match self.output()? {
            Output::Object(instance) => Ok(instance),
            other => Err(other.unexpected("object")),
        }
    }

    /// The output as a list of instances.
    pub fn into_list(self) -> Result<ResourceInstanceList, ApiError> {
        match self.output()? {
            Output::ObjectList(list) => Ok(list),
            Output::Empty => Ok(ResourceInstanceList::new(Vec::new(), self.total_count())),
            other => Err(other.unexpected("object_list")),
        }
    }

    /// Deserializes the payload into a caller-defined type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let payload = self.payload().cloned().unwrap_or(Value::Null);
        serde_json::from_value(payload).map_err(|e| {
            ProtocolError::UnexpectedOutput {
                expected: std::any::type_name::<T>().to_string(),
                actual: e.to_string(),
            }
            .into()
        })
    }

    /// Waits for a blocking action to finish.
    ///
    /// Returns `None` when the reply carries no action state, e.g. because
    /// the action completed right away.
    pub async fn wait_for_completion(
        &self,
        waiter: &ActionStateWaiter,
    ) -> Result<Option<WaitOutcome>, ApiError> {
        match self.action_state_id() {
            Some(id) => Ok(Some(waiter.wait(&self.client, id).await?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for ActionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionResponse")
            .field("resource", &self.resource)
            .field("action", &self.action.name)
            .field("args", &self.args)
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_object<'a>(value: &'a Value, expected: &str) -> Result<&'a Map<String, Value>, ApiError> {
    value.as_object().ok_or_else(|| {
        ProtocolError::UnexpectedOutput {
            expected: expected.to_string(),
            actual: describe(value).to_string(),
        }
        .into()
    })
}

fn as_array<'a>(value: &'a Value, expected: &str) -> Result<&'a Vec<Value>, ApiError> {
    value.as_array().ok_or_else(|| {
        ProtocolError::UnexpectedOutput {
            expected: expected.to_string(),
            actual: describe(value).to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use haveapi_schema::{IoSpec, ParameterDescriptor, ParameterType, RestMethod};
    use serde_json::json;

    fn response(layout: Layout, body: Value) -> ActionResponse {
        let client = Client::new("http://127.0.0.1:9").unwrap();
        let version = Arc::new(VersionDescription::from_value(json!({"resources": {}})).unwrap());
        let action = ActionDescriptor::new("index", RestMethod::Get, "/v1/projects").with_output(
            IoSpec::new(layout, "projects").param("id", ParameterDescriptor::new(ParameterType::Integer)),
        );
        let envelope = Envelope::parse(&body.to_string()).unwrap();
        ActionResponse::new(client, version, "project".into(), action, Vec::new(), envelope)
    }

    #[test]
    fn test_object_list_with_total_count() {
        let list = response(
            Layout::ObjectList,
            json!({
                "status": true,
                "response": {"projects": [{"id": 1}, {"id": 2}], "_meta": {"total_count": 10}}
            }),
        )
        .into_list()
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.total_count(), Some(10));
        assert_eq!(list.get(1).unwrap().id(), Some(&json!(2)));
    }

    #[test]
    fn test_hash_output() {
        let output = response(
            Layout::Hash,
            json!({"status": true, "response": {"projects": {"a": 1}}}),
        )
        .output()
        .unwrap();
        assert!(matches!(output, Output::Hash(map) if map["a"] == 1));
    }

    #[test]
    fn test_wrong_shape() {
        let err = response(
            Layout::ObjectList,
            json!({"status": true, "response": {"projects": {"id": 1}}}),
        )
        .into_list()
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Protocol(ProtocolError::UnexpectedOutput { expected, actual })
                if expected == "object_list" && actual == "object"
        ));
    }

    #[test]
    fn test_action_state_id() {
        let response = response(
            Layout::Object,
            json!({"status": true, "response": {"projects": {"id": 1}, "_meta": {"action_state_id": 42}}}),
        );
        assert_eq!(response.action_state_id(), Some(42));
        assert!(matches!(response.output().unwrap(), Output::Object(_)));
    }

    #[test]
    fn test_deserialize() {
        #[derive(serde::Deserialize)]
        struct Project {
            id: u64,
        }
        let projects: Vec<Project> = response(
            Layout::ObjectList,
            json!({"status": true, "response": {"projects": [{"id": 4}]}}),
        )
        .deserialize()
        .unwrap();
        assert_eq!(projects[0].id, 4);
    }
}
