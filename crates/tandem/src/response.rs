//! Values flowing between batches and into the terminal callbacks.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Error produced by a single operation.
///
/// Wraps the operation's `anyhow::Error` behind an `Arc` so the same failure
/// can sit in a result list, travel inside an [`EngineError`](crate::EngineError),
/// and be handed to every waiter of a shared in-flight request.
#[derive(Clone)]
pub struct OperationError(Arc<anyhow::Error>);

impl OperationError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::new(anyhow::Error::msg(message))
    }

    /// The underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Outcome of an operation, a batch, or a whole run.
///
/// A batch with a single operation contributes that operation's outcome
/// directly; anything larger is a [`Response::List`] indexed by submission
/// order. Failed operations keep their slot as [`Response::Error`].
#[derive(Debug, Clone)]
pub enum Response {
    Value(Value),
    Error(OperationError),
    List(Vec<Response>),
}

impl Response {
    /// Collapses a one-element list into its element.
    pub fn unwrap_single(mut items: Vec<Response>) -> Response {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Response::List(items)
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Response::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&OperationError> {
        match self {
            Response::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Response]> {
        match self {
            Response::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Element `index` of a list response.
    pub fn get(&self, index: usize) -> Option<&Response> {
        self.as_list().and_then(|items| items.get(index))
    }

    /// Converts to plain JSON, rendering failures as `{"error": "<message>"}`.
    pub fn to_json(&self) -> Value {
        match self {
            Response::Value(value) => value.clone(),
            Response::Error(error) => serde_json::json!({ "error": error.to_string() }),
            Response::List(items) => Value::Array(items.iter().map(Response::to_json).collect()),
        }
    }
}

impl From<Value> for Response {
    fn from(value: Value) -> Self {
        Response::Value(value)
    }
}

impl From<Result<Value, OperationError>> for Response {
    fn from(outcome: Result<Value, OperationError>) -> Self {
        match outcome {
            Ok(value) => Response::Value(value),
            Err(error) => Response::Error(error),
        }
    }
}

impl PartialEq<Value> for Response {
    fn eq(&self, other: &Value) -> bool {
        self.as_value() == Some(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_item_list_collapses_to_scalar() {
        let collapsed = Response::unwrap_single(vec![Response::Value(json!(7))]);
        assert_eq!(collapsed, json!(7));

        let kept = Response::unwrap_single(vec![json!(1).into(), json!(2).into()]);
        assert_eq!(kept.as_list().map(<[Response]>::len), Some(2));

        let empty = Response::unwrap_single(Vec::new());
        assert_eq!(empty.as_list().map(<[Response]>::len), Some(0));
    }

    #[test]
    fn to_json_renders_errors_in_place() {
        let response = Response::List(vec![
            json!({"id": 1}).into(),
            Response::Error(OperationError::msg("boom")),
        ]);

        assert_eq!(response.to_json(), json!([{"id": 1}, {"error": "boom"}]));
    }
}
