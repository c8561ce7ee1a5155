//!
//! dtask-runtime: the public surface of the dtask scheduler.
//!
//! `Runtime` owns a `dtask_core::Engine` and translates the caller-facing
//! `Arg` classification into the address/size/writable records the engine's
//! conflict scan compares. `Observer` layers scoped wait-for-subtasks on
//! top of the same primitives `wait_for_all`/`wait_for` use.
//!

mod arg;
mod observer;
mod runtime;

pub use arg::Arg;
pub use observer::Observer;
pub use runtime::{Runtime, RuntimeBuilder};

/// Construction and `set_threads`/`set_task_queue_limit` misconfiguration.
/// Re-exported from `dtask-core`, which already defines the only two ways a
/// caller can hand this crate an invalid argument.
pub use dtask_core::CoreError as ConfigError;
pub use dtask_core::{Range, TaskPanic};
