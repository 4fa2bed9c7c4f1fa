//! Per-batch outcome counters and their classification.

use serde_json::Value;

use crate::response::{OperationError, Response};

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total_requests: usize,
    pub total_complete: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub required_success_count: usize,
    pub required_error_count: usize,
    pub optional_success_count: usize,
    pub optional_error_count: usize,
    /// One slot per operation, in submission order.
    pub results: Vec<Response>,
}

/// How a finished batch affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fulfilled,
    OptionalFailed,
    RequiredFailed,
    Inconsistent,
}

impl BatchResult {
    pub fn new(total_requests: usize) -> Self {
        Self {
            total_requests,
            results: Vec::with_capacity(total_requests),
            ..Self::default()
        }
    }

    /// Records one settled operation and stores its outcome in the next slot.
    pub fn record(&mut self, required: bool, outcome: Result<Value, OperationError>) {
        self.total_complete += 1;
        match (&outcome, required) {
            (Ok(_), true) => self.required_success_count += 1,
            (Ok(_), false) => self.optional_success_count += 1,
            (Err(_), true) => self.required_error_count += 1,
            (Err(_), false) => self.optional_error_count += 1,
        }
        if outcome.is_ok() {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.results.push(outcome.into());
    }

    pub fn is_complete(&self) -> bool {
        self.total_complete == self.total_requests
    }

    /// Required errors win over optional ones; counters that do not add up
    /// are reported rather than trusted.
    pub fn verdict(&self) -> Verdict {
        if self.required_error_count > 0 {
            Verdict::RequiredFailed
        } else if !self.is_complete() || self.results.len() != self.total_requests {
            Verdict::Inconsistent
        } else if self.optional_error_count > 0 {
            Verdict::OptionalFailed
        } else if self.success_count == self.total_requests {
            Verdict::Fulfilled
        } else {
            Verdict::Inconsistent
        }
    }

    /// The value this batch contributes to the run: a scalar for a
    /// single-operation batch, a list otherwise.
    pub fn to_response(&self) -> Response {
        Response::unwrap_single(self.results.clone())
    }

    pub fn into_response(self) -> Response {
        Response::unwrap_single(self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed() -> Result<Value, OperationError> {
        Err(OperationError::msg("failed"))
    }

    #[test]
    fn empty_batch_is_fulfilled() {
        let result = BatchResult::new(0);
        assert_eq!(result.verdict(), Verdict::Fulfilled);
        assert_eq!(result.to_response().as_list().map(<[Response]>::len), Some(0));
    }

    #[test]
    fn counters_track_required_and_optional_separately() {
        let mut result = BatchResult::new(3);
        result.record(true, Ok(json!(1)));
        result.record(false, failed());
        result.record(false, Ok(json!(3)));

        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.required_success_count, 1);
        assert_eq!(result.optional_success_count, 1);
        assert_eq!(result.optional_error_count, 1);
        assert_eq!(result.verdict(), Verdict::OptionalFailed);
    }

    #[test]
    fn required_error_wins_over_optional_error() {
        let mut result = BatchResult::new(2);
        result.record(false, failed());
        result.record(true, failed());

        assert_eq!(result.verdict(), Verdict::RequiredFailed);
    }

    #[test]
    fn incomplete_batch_is_inconsistent() {
        let mut result = BatchResult::new(2);
        result.record(true, Ok(json!(1)));

        assert_eq!(result.verdict(), Verdict::Inconsistent);
    }

    #[test]
    fn single_operation_batch_contributes_scalar() {
        let mut result = BatchResult::new(1);
        result.record(true, Ok(json!({"id": 1})));

        assert_eq!(result.into_response(), json!({"id": 1}));
    }
}
