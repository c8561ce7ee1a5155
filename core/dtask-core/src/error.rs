//!
//! Error types for the dependency engine.
//!
//! Caller-facing misconfiguration is a `thiserror` enum; an engine invariant
//! that a caller cannot violate (a corrupted pool slot, a dangling worklist
//! pointer) is a `debug_assert!`/`unreachable!` at its call site instead of a
//! `Result`, matching how the teacher workspace reserves typed errors for
//! conditions a caller can actually trigger.
//!

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid worker thread count {requested} (available parallelism is {available})")]
    InvalidThreadCount { requested: i64, available: usize },

    #[error("invalid task queue limit {0}, must be at least 1")]
    InvalidQueueLimit(usize),
}

/// Carries a caught task-body panic so it can be re-raised at the next wait,
/// per the panic propagation rules of the ambient error-handling stack.
#[derive(Debug, Clone)]
pub struct TaskPanic {
    pub message: String,
}

impl std::fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

impl std::error::Error for TaskPanic {}

pub(crate) fn describe_panic_payload(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
