//! Session configuration

use serde::{Deserialize, Serialize};

/// Default global name of the continuation hook installed into each session.
pub const DEFAULT_TASK_HOOK: &str = "queueMicrotask";

/// Options applied while a [`Session`](crate::Session) is being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Engine heap limit in bytes. `None` keeps the engine default.
    pub memory_limit: Option<usize>,
    /// Maximum native stack the engine may use, in bytes.
    pub max_stack_size: Option<usize>,
    /// Install a `console` object that forwards to `tracing`.
    pub console: bool,
    /// Global function name scripts use to schedule continuations on the
    /// session task queue. `None` disables the hook.
    pub task_hook: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            console: false,
            task_hook: Some(DEFAULT_TASK_HOOK.to_string()),
        }
    }
}
