//!
//! The public `Runtime` handle: construction, `spawn`, and the two waits
//! (§6 "Construction surface").
//!

use std::sync::{Arc, OnceLock};

use dtask_core::{CoreError, Engine, Status, TaskPanic, WorkItem};

use crate::arg::{lower, Arg};
use crate::observer::Observer;

/// Builds a `Runtime`. `threads` defaults to `std::thread::available_parallelism()`;
/// a negative value is interpreted as "that many fewer than available" per §6.
#[derive(Default)]
pub struct RuntimeBuilder {
    threads: Option<i64>,
    queue_limit: Option<usize>,
}

impl RuntimeBuilder {
    pub fn threads(mut self, n: i64) -> Self {
        self.threads = Some(n);
        self
    }

    pub fn task_queue_limit(mut self, n: usize) -> Self {
        self.queue_limit = Some(n);
        self
    }

    pub fn build(self) -> Result<Runtime, CoreError> {
        let available = available_parallelism();
        let requested = self.threads.unwrap_or(available as i64);
        let effective = resolve_thread_count(requested, available)?;
        if let Some(limit) = self.queue_limit {
            if limit == 0 {
                return Err(CoreError::InvalidQueueLimit(limit));
            }
        }
        let engine = Engine::new(effective);
        if let Some(limit) = self.queue_limit {
            engine.set_steal_threshold(limit);
        }
        tracing::info!(threads = effective, "runtime constructed");
        Ok(Runtime { engine })
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn resolve_thread_count(requested: i64, available: usize) -> Result<usize, CoreError> {
    let effective = if requested < 0 { available as i64 + requested } else { requested };
    if effective <= 0 {
        return Err(CoreError::InvalidThreadCount { requested, available });
    }
    Ok(effective as usize)
}

pub struct Runtime {
    pub(crate) engine: Arc<Engine>,
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// A process-wide default runtime, built lazily at `available_parallelism()`
    /// threads on first use.
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(|| {
            Runtime::builder()
                .build()
                .expect("default thread count derived from available parallelism is always valid")
        })
    }

    pub fn thread_count(&self) -> usize {
        self.engine.thread_count()
    }

    /// §4.2 "set thread count": blocks until the current session is idle,
    /// then tears the pool down and relaunches it at the new size.
    pub fn set_threads(&self, n: i64) -> Result<(), CoreError> {
        let available = available_parallelism();
        let effective = resolve_thread_count(n, available)?;
        self.engine.resize_threads(effective);
        Ok(())
    }

    pub fn set_task_queue_limit(&self, limit: usize) -> Result<(), CoreError> {
        if limit == 0 {
            return Err(CoreError::InvalidQueueLimit(limit));
        }
        self.engine.set_steal_threshold(limit);
        Ok(())
    }

    /// Non-blocking. Links `body` into the worklist as a new work item,
    /// nested under whatever task (if any) the calling thread is currently
    /// executing, and returns immediately — `body` has not necessarily run
    /// by the time this call returns.
    pub fn spawn<F>(&self, body: F, args: Vec<Arg>)
    where
        F: FnOnce() + Send + 'static,
    {
        let records = lower(args);
        let parent = dtask_core::current_work_item();
        self.engine.spawn(records, parent, Box::new(body));
    }

    /// Blocks until every task spawned in the current session has finished,
    /// then releases the worklist so the next `spawn` starts a fresh
    /// session. Re-raises the first task panic recorded during the session,
    /// if any.
    pub fn wait_for_all(&self) -> Result<(), TaskPanic> {
        self.engine.spin_until_idle();
        self.engine.truncate_worklist();
        match self.engine.take_first_panic() {
            Some(panic) => Err(panic),
            None => Ok(()),
        }
    }

    /// Blocks only until every *currently pending* task touching `args` has
    /// finished, by spawning a synthetic read-only task over those same
    /// memory descriptors and waiting for it specifically (§4.4, §6).
    /// Propagates a task panic observed anywhere in the session so far.
    pub fn wait_for(&self, args: Vec<Arg>) -> Result<(), TaskPanic> {
        let mut records = Vec::new();
        for record in lower(args) {
            records.push(dtask_core::ArgRecord { writable: false, ..record });
        }
        let parent = dtask_core::current_work_item();
        let marker: Arc<WorkItem> = self.engine.spawn(records, parent, Box::new(|| {}));
        while marker.status() < Status::Deallocatable {
            if !self.engine.try_help(&marker) && !self.engine.run_one_if_ready() {
                std::thread::yield_now();
            }
        }
        match self.engine.peek_first_panic() {
            Some(panic) => Err(panic),
            None => Ok(()),
        }
    }

    /// Blocks until every task spawned (transitively) inside the task the
    /// calling thread is currently executing has finished. Equivalent to
    /// constructing an [`Observer`] and immediately dropping it; exposed as
    /// its own method for callers that don't need the scoped form.
    pub fn wait_for_subtasks(&self, priority: bool) -> Result<(), TaskPanic> {
        {
            let _observer = Observer::with_priority(self, priority);
        }
        match self.engine.peek_first_panic() {
            Some(panic) => Err(panic),
            None => Ok(()),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_thread_count_counts_down_from_available() {
        assert_eq!(resolve_thread_count(-1, 4).unwrap(), 3);
    }

    #[test]
    fn thread_count_below_one_is_rejected() {
        assert!(resolve_thread_count(-4, 4).is_err());
        assert!(resolve_thread_count(0, 4).is_err());
    }

    #[test]
    fn spawn_and_wait_for_all_runs_the_body() {
        let runtime = Runtime::builder().threads(2).build().unwrap();
        let mut x = 0i32;
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag2 = std::sync::Arc::clone(&flag);
        runtime.spawn(
            move || {
                flag2.store(true, std::sync::atomic::Ordering::SeqCst);
            },
            vec![Arg::ignore(&mut x)],
        );
        runtime.wait_for_all().unwrap();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn a_panicking_task_is_reported_at_wait_for_all() {
        let runtime = Runtime::builder().threads(2).build().unwrap();
        runtime.spawn(|| panic!("boom"), vec![]);
        let result = runtime.wait_for_all();
        assert!(result.is_err());
    }
}
