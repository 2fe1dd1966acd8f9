//! HTTP verbs used by described actions.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// HTTP method an action is routed under.
///
/// Descriptions send the verb in upper case (`"GET"`, `"POST"`, ...).
///
/// ## Examples
///
/// ```rust
/// use haveapi_schema::RestMethod;
///
/// let method: RestMethod = "POST".parse().unwrap();
/// assert!(method.has_body());
/// assert_eq!(RestMethod::Get.to_string(), "GET");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RestMethod {
    /// HTTP GET - read an object or list.
    Get,
    /// HTTP POST - create or trigger.
    Post,
    /// HTTP PUT - update.
    Put,
    /// HTTP PATCH - partial update.
    Patch,
    /// HTTP DELETE - remove.
    Delete,
    /// HTTP OPTIONS - capability discovery.
    Options,
}

impl RestMethod {
    /// Returns `true` if input parameters travel in a JSON body.
    ///
    /// Every verb except GET and OPTIONS carries a body; those two encode
    /// input as query parameters instead.
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Options)
    }

    /// Returns `true` if this method is safe (read-only).
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Options)
    }
}
