//! Resource descriptors and name lookup.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::action::ActionDescriptor;

/// What a name resolves to inside a resource.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    /// A nested resource.
    Resource(&'a ResourceDescriptor),
    /// An action of this resource.
    Action(&'a ActionDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKey {
    Resource(String),
    Action(String),
}

/// Description of a resource: its actions and nested resources.
///
/// Both children and actions are reachable by name, and actions also by any
/// declared alias, through an explicit lookup table built on construction.
/// A nested resource shadows an action of the same name.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawResource")]
pub struct ResourceDescriptor {
    /// Resource name; filled in from the enclosing map key.
    pub name: String,
    pub description: Option<String>,
    pub actions: BTreeMap<String, ActionDescriptor>,
    pub resources: BTreeMap<String, ResourceDescriptor>,
    lookup: BTreeMap<String, NodeKey>,
}

impl ResourceDescriptor {
    /// Creates a resource from its parts.
    pub fn new(
        name: impl Into<String>,
        actions: impl IntoIterator<Item = ActionDescriptor>,
        resources: impl IntoIterator<Item = ResourceDescriptor>,
    ) -> Self {
        let mut resource = Self {
            name: name.into(),
            description: None,
            actions: actions.into_iter().map(|a| (a.name.clone(), a)).collect(),
            resources: resources.into_iter().map(|r| (r.name.clone(), r)).collect(),
            lookup: BTreeMap::new(),
        };
        resource.build_lookup();
        resource
    }

    fn build_lookup(&mut self) {
        let mut lookup = BTreeMap::new();
        for action in self.actions.values() {
            for alias in &action.aliases {
                lookup.insert(alias.clone(), NodeKey::Action(action.name.clone()));
            }
        }
        for name in self.actions.keys() {
            lookup.insert(name.clone(), NodeKey::Action(name.clone()));
        }
        for name in self.resources.keys() {
            lookup.insert(name.clone(), NodeKey::Resource(name.clone()));
        }
        self.lookup = lookup;
    }

    /// Resolves a child resource or action by name or alias.
    pub fn lookup(&self, name: &str) -> Option<NodeRef<'_>> {
        match self.lookup.get(name)? {
            NodeKey::Resource(key) => self.resources.get(key).map(NodeRef::Resource),
            NodeKey::Action(key) => self.actions.get(key).map(NodeRef::Action),
        }
    }

    /// Resolves an action by name or alias.
    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        match self.lookup.get(name)? {
            NodeKey::Action(key) => self.actions.get(key),
            NodeKey::Resource(_) => self
                .actions
                .get(name)
                .or_else(|| self.actions.values().find(|a| a.answers_to(name))),
        }
    }

    /// Resolves a nested resource by name.
    pub fn resource(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.get(name)
    }

    /// The action used to fetch a single instance: `show`, or `index` when
    /// the resource has no `show` action.
    pub fn show_action(&self) -> Option<&ActionDescriptor> {
        self.action("show").or_else(|| self.action("index"))
    }

    /// Returns `true` for resources addressed without an id of their own,
    /// such as the current user.
    ///
    /// A resource is singular when its `show` URL has no more placeholders
    /// than its `index` URL, or when it has a `show` action but no `index`
    /// and the `show` URL carries no placeholders at all.
    pub fn is_singular(&self) -> bool {
        let Some(show) = self.action("show") else {
            return false;
        };
        let show_params = placeholder_count(&show.url);
        match self.action("index") {
            Some(index) => show_params <= placeholder_count(&index.url),
            None => show_params == 0,
        }
    }
}

/// Counts `:param` and `{param}` placeholders in a URL template.
pub fn placeholder_count(template: &str) -> usize {
    template
        .split('/')
        .filter(|segment| {
            (segment.starts_with(':') && segment.len() > 1)
                || (segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2)
        })
        .count()
}

/// Deserializes a `{name: resource}` map, naming each resource after its key.
pub(crate) fn named_resources<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ResourceDescriptor>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut resources = BTreeMap::<String, ResourceDescriptor>::deserialize(deserializer)?;
    for (name, resource) in resources.iter_mut() {
        resource.name = name.clone();
    }
    Ok(resources)
}

#[derive(Deserialize)]
struct RawResource {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    actions: BTreeMap<String, ActionDescriptor>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceDescriptor>,
}

impl From<RawResource> for ResourceDescriptor {
    fn from(raw: RawResource) -> Self {
        let actions = raw
            .actions
            .into_iter()
            .map(|(name, mut action)| {
                action.name = name.clone();
                (name, action)
            })
            .collect();
        let resources = raw
            .resources
            .into_iter()
            .map(|(name, mut resource)| {
                resource.name = name.clone();
                (name, resource)
            })
            .collect();

        let mut resource = Self {
            name: String::new(),
            description: raw.description,
            actions,
            resources,
            lookup: BTreeMap::new(),
        };
        resource.build_lookup();
        resource
    }
}
