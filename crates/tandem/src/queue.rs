//! FIFO queue of batches awaiting execution.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::operation::{OperationDescriptor, Requests};

/// Scheduling mode of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// All operations are dispatched together.
    #[default]
    Parallel,
    /// Operations run one after another in submission order.
    Series,
}

/// A set of operations submitted together under one mode.
#[derive(Debug)]
pub enum Batch {
    Parallel(Vec<OperationDescriptor>),
    Series(Vec<OperationDescriptor>),
}

impl Batch {
    pub fn new(mode: Mode, requests: Requests) -> Self {
        let items = requests.into_descriptors();
        match mode {
            Mode::Parallel => Batch::Parallel(items),
            Mode::Series => Batch::Series(items),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Batch::Parallel(_) => Mode::Parallel,
            Batch::Series(_) => Mode::Series,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Parallel(items) | Batch::Series(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch plus the group name it was submitted under, if any.
#[derive(Debug)]
pub struct QueuedBatch {
    pub group: Option<String>,
    pub batch: Batch,
}

/// Ordered, append-only sequence of batches.
#[derive(Debug, Default)]
pub struct BatchQueue {
    batches: VecDeque<QueuedBatch>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: Option<String>, batch: Batch) {
        self.batches.push_back(QueuedBatch { group, batch });
    }

    pub fn next(&mut self) -> Option<QueuedBatch> {
        self.batches.pop_front()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
