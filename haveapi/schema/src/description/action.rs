//! Action descriptors and their input/output specs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::parameter::ParameterDescriptor;
use crate::method::RestMethod;

/// Shape of an action's input or output payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Layout {
    /// A single object.
    #[default]
    Object,
    /// A list of objects.
    ObjectList,
    /// A free-form map.
    Hash,
    /// A list of free-form maps.
    HashList,
    /// Anything else; passed through untouched.
    #[serde(other)]
    Custom,
}

impl Layout {
    /// Returns `true` for layouts that materialize resource instances.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object | Self::ObjectList)
    }

    /// Returns `true` for list layouts.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::ObjectList | Self::HashList)
    }
}

/// Input or output specification of an action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IoSpec {
    #[serde(default)]
    pub layout: Layout,
    /// Envelope key the parameters are nested under.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDescriptor>,
}

impl IoSpec {
    /// Creates an empty spec.
    pub fn new(layout: Layout, namespace: impl Into<String>) -> Self {
        Self {
            layout,
            namespace: namespace.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn param(mut self, name: impl Into<String>, param: ParameterDescriptor) -> Self {
        self.parameters.insert(name.into(), param);
        self
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.get(name)
    }
}

/// Description of one invocable action.
///
/// Documents name the URL template `url` or `path` and the verb `method` or
/// `http_method`; when both spellings appear, `path` and `method` win.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct ActionDescriptor {
    /// Canonical name; filled in from the enclosing map key.
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub http_method: RestMethod,
    /// URL template with `:param` or `{param}` placeholders.
    pub url: String,
    pub input: Option<IoSpec>,
    pub output: Option<IoSpec>,
    pub blocking: bool,
    /// Whether the action requires authentication.
    pub auth: bool,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    method: Option<RestMethod>,
    #[serde(default)]
    http_method: Option<RestMethod>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    input: Option<IoSpec>,
    #[serde(default)]
    output: Option<IoSpec>,
    #[serde(default)]
    blocking: bool,
    #[serde(default = "default_auth")]
    auth: bool,
}

impl TryFrom<RawAction> for ActionDescriptor {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let http_method = raw
            .method
            .or(raw.http_method)
            .ok_or_else(|| "action is missing its HTTP method".to_string())?;
        let url = raw
            .path
            .or(raw.url)
            .ok_or_else(|| "action is missing its URL".to_string())?;
        Ok(Self {
            name: String::new(),
            description: raw.description,
            aliases: raw.aliases,
            http_method,
            url,
            input: raw.input,
            output: raw.output,
            blocking: raw.blocking,
            auth: raw.auth,
        })
    }
}

fn default_auth() -> bool {
    true
}

impl ActionDescriptor {
    /// Creates a descriptor without input or output.
    pub fn new(name: impl Into<String>, http_method: RestMethod, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            http_method,
            url: url.into(),
            input: None,
            output: None,
            blocking: false,
            auth: true,
        }
    }

    /// Sets the input spec.
    pub fn with_input(mut self, input: IoSpec) -> Self {
        self.input = Some(input);
        self
    }

    /// Sets the output spec.
    pub fn with_output(mut self, output: IoSpec) -> Self {
        self.output = Some(output);
        self
    }

    /// Adds an alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Returns `true` if `name` is this action's name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    /// Input parameters, empty when the action takes no input.
    pub fn input_parameters(&self) -> impl Iterator<Item = (&String, &ParameterDescriptor)> {
        self.input.iter().flat_map(|io| io.parameters.iter())
    }

    /// Output parameters, empty when the action returns nothing structured.
    pub fn output_parameters(&self) -> impl Iterator<Item = (&String, &ParameterDescriptor)> {
        self.output.iter().flat_map(|io| io.parameters.iter())
    }
}
