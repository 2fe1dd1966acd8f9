//! Binding of positional path arguments to action URL templates.
//!
//! Templates name their placeholders either `:project_id` (a whole path
//! segment) or `{project_id}` (anywhere in a segment). Arguments bind to
//! placeholders strictly in the order the placeholders appear. Bound
//! values are percent-encoded, so an argument can never add segments, a
//! query or a fragment to the path.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use tracing::debug;

/// Everything except RFC 3986 unreserved characters.
const PATH_ARG_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Why arguments could not be bound to a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// Fewer arguments than placeholders.
    Unbound { required: usize, supplied: usize },
    /// A bound segment came out as `.` or `..`, which URL parsing would
    /// resolve as a relative step.
    DotSegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn pieces(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    for (i, segment) in template.split('/').enumerate() {
        if i > 0 {
            pieces.push(Piece::Literal("/"));
        }
        if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
            pieces.push(Piece::Placeholder(name));
            continue;
        }

        let mut rest = segment;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            if open > 0 {
                pieces.push(Piece::Literal(&rest[..open]));
            }
            if close > open + 1 {
                pieces.push(Piece::Placeholder(&rest[open + 1..close]));
            } else {
                pieces.push(Piece::Literal("{}"));
            }
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest));
        }
    }
    pieces
}

/// Placeholder names in declaration order.
pub fn placeholders(template: &str) -> Vec<&str> {
    pieces(template)
        .into_iter()
        .filter_map(|p| match p {
            Piece::Placeholder(name) => Some(name),
            Piece::Literal(_) => None,
        })
        .collect()
}

/// Renders an argument as plain text, as used for query values.
pub fn path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn encoded_segment(value: &Value) -> String {
    utf8_percent_encode(&path_segment(value), PATH_ARG_ENCODE_SET).to_string()
}

fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}

/// Substitutes `args` into `template` in placeholder order.
///
/// Arguments beyond the number of placeholders are ignored.
///
/// ## Errors
///
/// Returns [`BindError::Unbound`] when fewer arguments than placeholders are
/// supplied and [`BindError::DotSegment`] when an argument would turn a
/// segment into `.` or `..`.
pub fn bind(template: &str, args: &[Value]) -> Result<String, BindError> {
    let pieces = pieces(template);
    let required = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Placeholder(_)))
        .count();
    if args.len() < required {
        return Err(BindError::Unbound {
            required,
            supplied: args.len(),
        });
    }
    if args.len() > required {
        debug!(template, required, supplied = args.len(), "ignoring surplus path arguments");
    }

    let mut args = args.iter();
    let mut url = String::with_capacity(template.len());
    let mut segment_start = 0;
    let mut segment_bound = false;
    for piece in pieces {
        match piece {
            Piece::Literal("/") => {
                if segment_bound && is_dot_segment(&url[segment_start..]) {
                    return Err(BindError::DotSegment(url[segment_start..].to_string()));
                }
                url.push('/');
                segment_start = url.len();
                segment_bound = false;
            }
            Piece::Literal(text) => url.push_str(text),
            Piece::Placeholder(_) => {
                if let Some(arg) = args.next() {
                    url.push_str(&encoded_segment(arg));
                    segment_bound = true;
                }
            }
        }
    }
    if segment_bound && is_dot_segment(&url[segment_start..]) {
        return Err(BindError::DotSegment(url[segment_start..].to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(
            placeholders("/v1/projects/:project_id/tasks/:task_id"),
            ["project_id", "task_id"]
        );
        assert_eq!(
            placeholders("/v1/projects/{project_id}/tasks/{task_id}"),
            ["project_id", "task_id"]
        );
        assert!(placeholders("/v1/projects").is_empty());
    }

    #[test]
    fn test_bind_colon_style() {
        assert_eq!(
            bind("/projects/:project_id/tasks", &[json!(7)]).unwrap(),
            "/projects/7/tasks"
        );
    }

    #[test]
    fn test_bind_brace_style_inside_segment() {
        assert_eq!(
            bind("/v1/files/{name}.json", &[json!("report")]).unwrap(),
            "/v1/files/report.json"
        );
    }

    #[test]
    fn test_bind_too_few() {
        assert_eq!(
            bind("/projects/:project_id/tasks/:task_id", &[json!(7)]),
            Err(BindError::Unbound {
                required: 2,
                supplied: 1
            })
        );
    }

    #[test]
    fn test_bind_surplus_ignored() {
        assert_eq!(
            bind("/projects/:project_id", &[json!(7), json!(8)]).unwrap(),
            "/projects/7"
        );
    }

    #[test]
    fn test_bind_escapes_reserved_characters() {
        assert_eq!(
            bind("/v1/users/:user_id/keys", &[json!("../../admin?x=1#top")]).unwrap(),
            "/v1/users/..%2F..%2Fadmin%3Fx%3D1%23top/keys"
        );
        assert_eq!(
            bind("/v1/files/{name}.json", &[json!("a b%")]).unwrap(),
            "/v1/files/a%20b%25.json"
        );
    }

    #[test]
    fn test_bind_rejects_dot_segments() {
        assert_eq!(
            bind("/v1/users/:user_id/keys", &[json!("..")]),
            Err(BindError::DotSegment("..".to_string()))
        );
        assert_eq!(
            bind("/v1/users/{user_id}", &[json!(".")]),
            Err(BindError::DotSegment(".".to_string()))
        );
        assert_eq!(bind("/v1/files/{name}.", &[json!("a")]).unwrap(), "/v1/files/a.");
    }

    #[test]
    fn test_bind_without_placeholders() {
        assert_eq!(bind("/v1/users/current", &[]).unwrap(), "/v1/users/current");
    }
}
