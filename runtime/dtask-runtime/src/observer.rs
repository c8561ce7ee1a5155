//!
//! `Observer`: scoped wait-for-subtasks (§4.8).
//!
//! Constructing one snapshots the current worklist head and suspends the GC
//! pass; dropping one blocks the calling thread until every work item
//! created since construction that belongs to the calling task's subtree
//! has finished, helping the pool drain ready work in the meantime instead
//! of just spinning. `priority` mirrors the base specification's flag for a
//! caller that would rather starve the shared ready queue of help than run
//! someone else's task while waiting on its own subtree.
//!

use std::sync::Arc;

use dtask_core::{Status, WorkItem};

use crate::Runtime;

pub struct Observer<'a> {
    runtime: &'a Runtime,
    limit: Option<Arc<WorkItem>>,
    father: Option<Arc<WorkItem>>,
    priority: bool,
}

impl<'a> Observer<'a> {
    pub fn new(runtime: &'a Runtime) -> Self {
        Self::with_priority(runtime, false)
    }

    /// A priority observer never helps drain unrelated ready work while it
    /// waits — it only runs items inside its own subtree.
    pub fn with_priority(runtime: &'a Runtime, priority: bool) -> Self {
        runtime.engine().enter_observer();
        Observer {
            runtime,
            limit: runtime.engine().snapshot_head(),
            father: dtask_core::current_work_item(),
            priority,
        }
    }

    fn belongs(&self, item: &Arc<WorkItem>) -> bool {
        match &self.father {
            Some(father) => Arc::ptr_eq(item, father) || item.has_ancestor(father),
            // At top level there is no enclosing task to scope the wait to;
            // every item created since construction counts.
            None => true,
        }
    }
}

impl Drop for Observer<'_> {
    fn drop(&mut self) {
        loop {
            let mut cur = self.runtime.engine().snapshot_head();
            let mut incomplete = false;
            let mut progressed = false;

            while let Some(item) = cur {
                if self.limit.as_ref().is_some_and(|l| Arc::ptr_eq(&item, l)) {
                    break;
                }
                if self.belongs(&item) && item.status() < Status::Done {
                    incomplete = true;
                    if self.runtime.engine().try_help(&item) {
                        progressed = true;
                    }
                }
                cur = item.next.lock().unwrap().clone();
            }

            if !incomplete {
                break;
            }
            if !progressed && !self.priority && self.runtime.engine().run_one_if_ready() {
                progressed = true;
            }
            if !progressed {
                std::thread::yield_now();
            }
        }
        self.runtime.engine().exit_observer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arg;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observer_waits_for_subtasks_spawned_during_its_scope() {
        let runtime = Runtime::builder().threads(2).build().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _observer = Observer::new(&runtime);
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                runtime.spawn(move || { counter.fetch_add(1, Ordering::SeqCst); }, vec![]);
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        runtime.wait_for_all().unwrap();
    }

    #[test]
    fn observer_on_an_unrelated_item_does_not_block_forever() {
        let runtime = Runtime::builder().threads(1).build().unwrap();
        let mut x = 0i32;
        {
            let _observer = Observer::new(&runtime);
            runtime.spawn(|| {}, vec![Arg::write(&mut x)]);
        }
        runtime.wait_for_all().unwrap();
    }
}
