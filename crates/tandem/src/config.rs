//! Handler configuration.

use serde::{Deserialize, Serialize};

use crate::queue::Mode;

/// Configuration for a [`RequestsHandler`](crate::RequestsHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allow the same group name to be submitted more than once.
    pub allow_duplicate_groups: bool,
    /// Mode used by [`RequestsHandler::requests`](crate::RequestsHandler::requests).
    pub default_mode: Mode,
    /// Start the drain without an explicit [`run`](crate::RequestsHandler::run).
    ///
    /// On a current-thread runtime the drain is spawned after the first
    /// submission. On a multi-thread runtime it starts when the chain closes,
    /// at the first `then`, `catch` or `wait`.
    ///
    /// When disabled the caller drives the run with
    /// [`RequestsHandler::run`](crate::RequestsHandler::run).
    pub auto_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_duplicate_groups: false,
            default_mode: Mode::Parallel,
            auto_start: true,
        }
    }
}

impl EngineConfig {
    pub fn with_allow_duplicate_groups(mut self, allow: bool) -> Self {
        self.allow_duplicate_groups = allow;
        self
    }

    pub fn with_default_mode(mut self, mode: Mode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}
