//!
//! dtask-core: the dependency-tracking engine behind the dtask scheduler.
//!
//! This crate has no opinion about what an "argument" means to a caller
//! beyond `(address, size, writable, optional array ranges)` — the
//! caller-facing argument classification (read/write/ignore/frozen/array
//! selections) and the public `Runtime`/`spawn`/`wait_for_*` surface live in
//! `dtask-runtime`, which drives this engine.
//!

pub mod arg;
pub mod engine;
pub mod error;
pub mod pool;
pub mod range;
pub mod thread_pool;
pub mod work_item;

pub use arg::ArgRecord;
pub use engine::{current_work_item, default_steal_threshold, Engine};
pub use error::{CoreError, TaskPanic};
pub use range::Range;
pub use work_item::{OptFlags, Runner, Status, WorkItem};
