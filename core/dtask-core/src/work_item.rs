//!
//! The work item: a spawned task's state machine, argument list, reverse
//! dependency list, and bound callable.
//!

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_utils::CachePadded;

use crate::arg::ArgRecord;
use crate::error::TaskPanic;

/// §4.7 state machine. The discriminants are ordinal so a scanner can do a
/// cheap `status_word >= Status::Done as u8` comparison, as the base
/// specification's "p.status < Done" / "p.status >= Done" tests assume.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Filling = 0,
    Waiting = 1,
    Ready = 2,
    Running = 3,
    Done = 4,
    Deallocatable = 5,
}

impl Status {
    fn from_u8(v: u8) -> Status {
        match v {
            0 => Status::Filling,
            1 => Status::Waiting,
            2 => Status::Ready,
            3 => Status::Running,
            4 => Status::Done,
            5 => Status::Deallocatable,
            _ => unreachable!("corrupt work item status word {v}"),
        }
    }
}

bitflags::bitflags! {
    /// §3 `opt_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OptFlags: u8 {
        /// An older worklist entry was still `Filling` when observed; the
        /// GC pass must not reclaim past this item until it settles.
        const PENDING_FILLS = 0b0000_0001;
        /// A parent in the worklist was found to contain all of this
        /// task's remaining writes; the conflict scan stopped early.
        const ANCESTOR_ESCAPE = 0b0000_0010;
    }
}

/// The callable bound to a work item. Stealing is implemented as
/// `Mutex::take()`: whichever party — the worker scheduled to run the task,
/// or a submitter/observer stealing it — successfully takes `Some(_)` out of
/// this mutex is the sole executor, which gives the same "first claimant
/// wins, the loser must not re-execute" guarantee the base spec describes
/// as a `guard` CAS paired with a swap-to-null, without a redundant field.
pub type Runner = Box<dyn FnOnce() + Send>;

pub struct WorkItem {
    pub id: u64,
    /// Cache-line separated from `pending`/`children`: the conflict scan
    /// reads `status` on every predecessor it walks, while a finishing
    /// predecessor concurrently updates its own `pending`/`children` — left
    /// adjacent, those writes would bounce the same cache line between
    /// threads on every scan.
    status: CachePadded<AtomicU8>,
    opt_flags: AtomicU8,
    /// Predecessors still to finish.
    pending: CachePadded<AtomicU32>,
    /// 1 + number of live direct children; reaching 0 means the task's own
    /// body has returned *and* every child's subtree has drained.
    children: CachePadded<AtomicU32>,
    pub args: Vec<ArgRecord>,
    pub next: Mutex<Option<Arc<WorkItem>>>,
    pub parent: Option<Arc<WorkItem>>,
    pub deps: Mutex<Vec<Arc<WorkItem>>>,
    runner: Mutex<Option<Runner>>,
    panic: Mutex<Option<TaskPanic>>,
}

impl WorkItem {
    /// `deps` is a recycled (and already-emptied) buffer handed in by the
    /// engine's `deps_pool` rather than a fresh zero-capacity `Vec`, so a
    /// busy task's reverse-dependency list doesn't reallocate on every
    /// spawn (§4.1).
    pub fn new(id: u64, args: Vec<ArgRecord>, parent: Option<Arc<WorkItem>>, runner: Runner, deps: Vec<Arc<WorkItem>>) -> Self {
        debug_assert!(deps.is_empty(), "a work item must start with an empty deps buffer");
        Self {
            id,
            status: CachePadded::new(AtomicU8::new(Status::Filling as u8)),
            opt_flags: AtomicU8::new(0),
            pending: CachePadded::new(AtomicU32::new(0)),
            children: CachePadded::new(AtomicU32::new(1)),
            args,
            next: Mutex::new(None),
            parent,
            deps: Mutex::new(deps),
            runner: Mutex::new(Some(runner)),
            panic: Mutex::new(None),
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, s: Status) {
        // Release: a scanner that observes `status >= Done` must also
        // observe every write this task performed before finishing (§5).
        self.status.store(s as u8, Ordering::Release);
    }

    pub fn opt_flags(&self) -> OptFlags {
        OptFlags::from_bits_truncate(self.opt_flags.load(Ordering::Relaxed))
    }

    pub(crate) fn set_opt_flag(&self, flag: OptFlags) {
        self.opt_flags.fetch_or(flag.bits(), Ordering::Relaxed);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn add_pending(&self, n: u32) {
        self.pending.fetch_add(n, Ordering::AcqRel);
    }

    /// Decrements `pending`; returns `true` if it just reached zero.
    pub(crate) fn dec_pending(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn add_child(&self) {
        self.children.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements `children`; returns `true` if it just reached zero, i.e.
    /// this call is the one that should run the finish path.
    pub(crate) fn dec_children(&self) -> bool {
        self.children.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Takes the bound callable, if nobody has taken it yet. The caller that
    /// receives `Some` is the task's sole executor.
    pub fn take_runner(&self) -> Option<Runner> {
        self.runner.lock().unwrap().take()
    }

    pub fn has_runner(&self) -> bool {
        self.runner.lock().unwrap().is_some()
    }

    pub fn record_panic(&self, p: TaskPanic) {
        *self.panic.lock().unwrap() = Some(p);
    }

    pub fn take_panic(&self) -> Option<TaskPanic> {
        self.panic.lock().unwrap().take()
    }

    /// Whether `maybe_ancestor` is `self`'s parent, grandparent, … (used
    /// when an Observer decides whether a worklist item belongs to the
    /// subtree it is waiting on).
    pub fn has_ancestor(&self, maybe_ancestor: &Arc<WorkItem>) -> bool {
        let mut cur = self.parent.clone();
        while let Some(p) = cur {
            if Arc::ptr_eq(&p, maybe_ancestor) {
                return true;
            }
            cur = p.parent.clone();
        }
        false
    }
}

/// Single-holder token permitting exactly one GC pass to run at a time
/// (§4.6 step 6, §5 "the eraser flag is a single mutex-of-convenience").
#[derive(Default)]
pub struct Eraser(AtomicBool);

impl Eraser {
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}
