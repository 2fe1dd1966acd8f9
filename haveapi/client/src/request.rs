//! Turns an action invocation into an [`OutgoingRequest`].
//!
//! Everything here is local: path binding and input validation fail before
//! a single byte reaches the network.

use serde_json::{Map, Value};
use tracing::warn;

use haveapi_schema::{prepare_input, ActionDescriptor, Params, VersionDescription};

use crate::connection::OutgoingRequest;
use crate::error::ApiError;
use crate::url_template::{self, path_segment, BindError};

/// Builds the request for one action call.
///
/// `action_path` is the dotted name used in error messages. GET requests
/// carry input and meta as `namespace[param]=value` query pairs; every other
/// verb sends `{input_namespace: {...}, meta_namespace: {...}}` as JSON.
pub(crate) fn build_request(
    version: &VersionDescription,
    action: &ActionDescriptor,
    action_path: &str,
    args: &[Value],
    params: &Params,
    meta: &Map<String, Value>,
) -> Result<OutgoingRequest, ApiError> {
    let path = url_template::bind(&action.url, args).map_err(|e| match e {
        BindError::Unbound { required, supplied } => ApiError::UnresolvedArguments {
            action: action_path.to_string(),
            required,
            supplied,
        },
        BindError::DotSegment(segment) => ApiError::InvalidArgument {
            action: action_path.to_string(),
            value: segment,
        },
    })?;

    let input = match &action.input {
        Some(io) => Some((io.namespace.as_str(), prepare_input(io, params)?)),
        None => {
            if !params.is_empty() {
                warn!(action = action_path, "action takes no input, dropping parameters");
            }
            None
        }
    };

    let mut request = OutgoingRequest::new(action.http_method, path);
    if action.http_method.has_body() {
        let mut body = Map::new();
        if let Some((namespace, values)) = input {
            if namespace.is_empty() {
                body.extend(values);
            } else {
                body.insert(namespace.to_string(), Value::Object(values));
            }
        }
        if !meta.is_empty() {
            body.insert(version.meta_namespace.clone(), Value::Object(meta.clone()));
        }
        request.body = Some(Value::Object(body));
    } else {
        if let Some((namespace, values)) = input {
            push_query(&mut request, namespace, &values);
        }
        push_query(&mut request, &version.meta_namespace, meta);
    }
    Ok(request)
}

fn push_query(request: &mut OutgoingRequest, namespace: &str, values: &Map<String, Value>) {
    for (name, value) in values {
        let key = if namespace.is_empty() {
            name.clone()
        } else {
            format!("{namespace}[{name}]")
        };
        request.query_param(key, path_segment(value));
    }
}
