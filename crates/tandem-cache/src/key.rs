//! Deterministic cache keys for requests.

use std::fmt;

use serde_json::Value;
use tandem_core::{HttpRequest, Method};

/// Cache key: method, normalized path, canonical query and body, laid out as
/// `METHOD_"path"?query__body`.
///
/// The path is written as a JSON string and the query and body as canonical
/// JSON, so every part is self-delimiting and separators inside a path cannot
/// make two requests collide. Object keys are sorted at every depth, so two
/// requests that differ only in key order share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: Method, path: &str, query: Option<&Value>, body: Option<&Value>) -> Self {
        let mut key = format!("{method}_");
        write_canonical(&Value::String(normalize_path(path)), &mut key);
        key.push('?');
        if let Some(query) = query.filter(|query| !query.is_null()) {
            write_canonical(query, &mut key);
        }
        key.push_str("__");
        if let Some(body) = body.filter(|body| !body.is_null()) {
            write_canonical(body, &mut key);
        }
        Self(key)
    }

    pub fn from_request(request: &HttpRequest) -> Self {
        Self::new(
            request.method,
            &request.path,
            request.query.as_ref(),
            request.body.as_ref(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&HttpRequest> for RequestKey {
    fn from(request: &HttpRequest) -> Self {
        Self::from_request(request)
    }
}

/// Trims whitespace, collapses repeated slashes and drops a trailing slash.
///
/// A scheme prefix such as `https://` is left alone.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let (scheme, rest) = match path.find("://") {
        Some(index) => path.split_at(index + 3),
        None => ("", path),
    };

    let mut normalized = String::with_capacity(path.len());
    normalized.push_str(scheme);
    let mut previous_slash = false;
    for ch in rest.chars() {
        if ch == '/' && previous_slash {
            continue;
        }
        previous_slash = ch == '/';
        normalized.push(ch);
    }

    if normalized.len() > scheme.len() + 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Serializes `value` as compact JSON with object keys sorted.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (name, field)) in fields.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn key_ignores_object_key_order() {
        let mut forward = Map::new();
        forward.insert("page".into(), json!(2));
        forward.insert("filter".into(), json!({"done": true, "owner": "ana"}));

        let mut backward = Map::new();
        backward.insert("filter".into(), json!({"owner": "ana", "done": true}));
        backward.insert("page".into(), json!(2));

        let a = RequestKey::new(Method::Get, "/todos", Some(&Value::Object(forward)), None);
        let b = RequestKey::new(Method::Get, "/todos", Some(&Value::Object(backward)), None);
        assert_eq!(a, b);
    }

    #[test]
    fn key_distinguishes_method_query_and_body() {
        let get = RequestKey::new(Method::Get, "/todos", None, None);
        let delete = RequestKey::new(Method::Delete, "/todos", None, None);
        let paged = RequestKey::new(Method::Get, "/todos", Some(&json!({"page": 1})), None);
        let posted = RequestKey::new(Method::Post, "/todos", None, Some(&json!({"title": "a"})));

        assert_ne!(get, delete);
        assert_ne!(get, paged);
        assert_eq!(get.as_str(), r#"GET_"/todos"?__"#);
        assert_eq!(paged.as_str(), r#"GET_"/todos"?{"page":1}__"#);
        assert_eq!(posted.as_str(), r#"POST_"/todos"?__{"title":"a"}"#);
    }

    #[test]
    fn separators_in_the_path_do_not_collide() {
        let queried = RequestKey::new(Method::Get, "/a", Some(&json!({"x": 1})), None);
        let literal = RequestKey::new(Method::Get, r#"/a?{"x":1}"#, None, None);
        assert_ne!(queried, literal);

        let with_body = RequestKey::new(Method::Post, "/todos", None, Some(&json!(1)));
        let underscored = RequestKey::new(Method::Post, "/todos__1", None, None);
        assert_ne!(with_body, underscored);

        let query_only = RequestKey::new(Method::Post, "/todos", Some(&json!(1)), None);
        assert_ne!(with_body, query_only);
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path(" /todos/ "), "/todos");
        assert_eq!(normalize_path("/users//1///posts"), "/users/1/posts");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("https://api.test//todos/"), "https://api.test/todos");
    }

    #[test]
    fn canonical_json_escapes_keys() {
        assert_eq!(canonical_json(&json!({"b\"x": [1, null], "a": "s"})), r#"{"a":"s","b\"x":[1,null]}"#);
    }
}
