//! Conversion of description verbs to `reqwest` methods.

use haveapi_schema::RestMethod;

/// Extension for [`RestMethod`], which lives in the I/O-free schema crate.
pub trait RestMethodExt {
    /// Converts to the equivalent `reqwest::Method`.
    fn to_reqwest(self) -> reqwest::Method;
}

impl RestMethodExt for RestMethod {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}
