//!
//! A resizeable group of worker threads driven by a shared run loop.
//!
//! Workers sleep on a condition variable (the "doorbell") between rounds
//! instead of busy-spinning; a producer that posts a ready task rings the
//! doorbell once to wake a sleeper. §4.2 requires the pool be manipulated
//! by exactly one external driver thread — `launch`/`stop_and_join` are not
//! safe to call from inside a worker's own run loop, and nothing in this
//! crate does so.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a worker sleeps before re-checking the ready queue even absent
/// a doorbell ring. Bounds the cost of a missed wakeup without requiring a
/// generation-counter handshake between `ring` and `wait`.
const DOORBELL_POLL: Duration = Duration::from_millis(5);

#[derive(Default)]
pub struct Doorbell {
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Doorbell {
    pub fn ring(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cvar.notify_all();
    }

    pub fn wait_briefly(&self) {
        let guard = self.lock.lock().unwrap();
        let _ = self.cvar.wait_timeout(guard, DOORBELL_POLL).unwrap();
    }
}

pub struct ThreadPool {
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    doorbell: Arc<Doorbell>,
}

impl ThreadPool {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            doorbell: Arc::new(Doorbell::default()),
        }
    }

    pub fn doorbell(&self) -> &Arc<Doorbell> {
        &self.doorbell
    }

    /// Starts `n` workers, each repeatedly invoking `body` until the pool is
    /// stopped.
    pub fn launch<F>(&self, n: usize, body: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shutdown.store(false, Ordering::Release);
        let body = Arc::new(body);
        let mut workers = self.workers.lock().unwrap();
        for _ in 0..n {
            let body = Arc::clone(&body);
            let shutdown = Arc::clone(&self.shutdown);
            workers.push(thread::spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    body();
                }
            }));
        }
    }

    /// Signals shutdown, wakes every sleeping worker, and joins them all.
    /// Leaves the pool ready for another `launch` call (§4.2 "set thread
    /// count" is implemented as stop-then-relaunch at a new size).
    pub fn stop_and_join(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.doorbell.ring();
        let mut workers = self.workers.lock().unwrap();
        for w in workers.drain(..) {
            let _ = w.join();
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
