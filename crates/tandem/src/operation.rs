//! Operation descriptors and the required/optional grouping used at submission.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::response::Response;

/// Future produced by an operation.
pub type OperationFuture = BoxFuture<'static, anyhow::Result<Value>>;

type Factory = Box<dyn FnOnce(Option<Response>) -> OperationFuture + Send>;

/// A unit of asynchronous work.
pub enum Operation {
    /// A pending operation that ignores earlier results.
    Ready(OperationFuture),
    /// Builds the operation from the results available when it is dispatched.
    Factory(Factory),
}

impl Operation {
    pub fn ready<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Operation::Ready(future.boxed())
    }

    pub fn factory<F, Fut>(factory: F) -> Self
    where
        F: FnOnce(Option<Response>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Operation::Factory(Box::new(move |prior| factory(prior).boxed()))
    }

    /// Turns the operation into a future, feeding factories `prior`.
    pub(crate) fn start(self, prior: Option<Response>) -> OperationFuture {
        match self {
            Operation::Ready(future) => future,
            Operation::Factory(factory) => factory(prior),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Ready(_) => f.write_str("Operation::Ready"),
            Operation::Factory(_) => f.write_str("Operation::Factory"),
        }
    }
}

/// An operation tagged with its failure severity.
#[derive(Debug)]
pub struct OperationDescriptor {
    pub required: bool,
    pub operation: Operation,
}

impl OperationDescriptor {
    pub fn required(operation: Operation) -> Self {
        Self {
            required: true,
            operation,
        }
    }

    pub fn optional(operation: Operation) -> Self {
        Self {
            required: false,
            operation,
        }
    }
}

/// Operations submitted together, each tagged required or optional.
///
/// Builder calls keep insertion order. [`Requests::grouped`] mirrors the
/// `{ required, optional }` form: required operations first, then optional
/// ones. A plain `Vec<Operation>` converts into an all-required grouping.
#[derive(Debug, Default)]
pub struct Requests {
    items: Vec<OperationDescriptor>,
}

impl Requests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grouped(required: Vec<Operation>, optional: Vec<Operation>) -> Self {
        let items = required
            .into_iter()
            .map(OperationDescriptor::required)
            .chain(optional.into_iter().map(OperationDescriptor::optional))
            .collect();
        Self { items }
    }

    pub fn required(mut self, operation: Operation) -> Self {
        self.items.push(OperationDescriptor::required(operation));
        self
    }

    pub fn optional(mut self, operation: Operation) -> Self {
        self.items.push(OperationDescriptor::optional(operation));
        self
    }

    pub fn push(&mut self, descriptor: OperationDescriptor) {
        self.items.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_descriptors(self) -> Vec<OperationDescriptor> {
        self.items
    }
}

impl From<Vec<Operation>> for Requests {
    fn from(required: Vec<Operation>) -> Self {
        Self::grouped(required, Vec::new())
    }
}

impl From<Operation> for Requests {
    fn from(operation: Operation) -> Self {
        Self::new().required(operation)
    }
}

impl From<Vec<OperationDescriptor>> for Requests {
    fn from(items: Vec<OperationDescriptor>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flags(requests: Requests) -> Vec<bool> {
        requests
            .into_descriptors()
            .iter()
            .map(|descriptor| descriptor.required)
            .collect()
    }

    fn op(value: &'static str) -> Operation {
        Operation::ready(async move { Ok(json!(value)) })
    }

    #[test]
    fn grouped_puts_required_before_optional() {
        let requests = Requests::grouped(vec![op("a")], vec![op("b"), op("c")]);
        assert_eq!(flags(requests), vec![true, false, false]);
    }

    #[test]
    fn builder_keeps_insertion_order() {
        let requests = Requests::new().optional(op("a")).required(op("b"));
        assert_eq!(flags(requests), vec![false, true]);
    }

    #[tokio::test]
    async fn factory_receives_prior_results() {
        let operation = Operation::factory(|prior: Option<Response>| async move {
            let prior = prior.and_then(|response| response.as_value().cloned());
            Ok(json!({ "saw": prior }))
        });

        let value = operation.start(Some(json!(41).into())).await.unwrap();
        assert_eq!(value, json!({"saw": 41}));
    }
}
