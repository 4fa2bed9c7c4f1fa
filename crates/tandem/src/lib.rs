//! # Tandem
//!
//! Runs batches of asynchronous requests in parallel or in series, each
//! request marked required or optional, and reports one outcome per run.
//!
//! ## Core Concepts
//!
//! - [`Operation`] = a pending request, or a factory that builds one from
//!   earlier results
//! - [`Requests`] = operations split into `required` and `optional`
//! - [`Batch`] = requests submitted together as [`Mode::Parallel`] or
//!   [`Mode::Series`]
//! - [`RequestsHandler`] = the queue of batches plus the run that drains it
//!
//! ## Architecture
//!
//! ```text
//! Facade (endpoints, UI bindings)
//!     │
//!     ▼ parallel() / series() / group()
//! BatchQueue ───────────────────────────────┐
//!     │                                     │
//!     ▼ deferred drain                      │
//! Batch 0 ─► Batch 1 ─► ... ─► Batch N      │  results of batch k feed
//!     │                                     │  factories in batch k+1
//!     ├─► required error ─► catch(RequiredFailure)
//!     ├─► optional error ─► keep going ─► catch(OptionalFailure)
//!     └─► all fulfilled  ─► then(results)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **FIFO batches** - Batch k+1 starts only after batch k settled
//! 2. **Stable slots** - Parallel results are indexed by submission order
//! 3. **Required aborts** - A required failure ends the run after its batch
//! 4. **Optional warns** - Optional failures surface once, at the end
//! 5. **One outcome** - Exactly one of `then`/`catch` fires, exactly once
//! 6. **At most one attempt** - Nothing is retried
//!
//! ## Example
//!
//! ```ignore
//! use tandem_core::{Operation, Requests, RequestsHandler};
//!
//! let handler = RequestsHandler::new();
//! handler
//!     .parallel(vec![fetch_user(), fetch_settings()])?
//!     .series(Requests::new()
//!         .required(Operation::factory(|prior| save_profile(prior)))
//!         .optional(Operation::factory(|so_far| notify(so_far))))?
//!     .then(|results| println!("loaded {results:?}"))
//!     .catch(|error| eprintln!("failed: {error}"));
//! ```

// Core modules
mod batch_result;
mod config;
mod engine;
mod error;
mod operation;
mod queue;
mod response;
mod transport;

// Re-export engine types (primary entry point)
pub use engine::{RequestsHandler, RunId};

// Re-export configuration
pub use config::EngineConfig;

// Re-export error types
pub use error::{EngineError, EngineResult, OptionalFailure, RequiredFailure};

// Re-export batch and operation types
pub use batch_result::{BatchResult, Verdict};
pub use operation::{Operation, OperationDescriptor, OperationFuture, Requests};
pub use queue::{Batch, BatchQueue, Mode, QueuedBatch};
pub use response::{OperationError, Response};

// Re-export transport seam
pub use transport::{request_operation, HttpRequest, Method, Transport};

// Re-export commonly used external types
pub use async_trait::async_trait;
