// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Re-entrant monitor used for every blocking boundary in this crate.
//!
//! The device lock, the transactional map lock on each resource and the
//! bind lock on each interned state object all share one property that a
//! lexically-scoped guard cannot express: they are acquired in one call and
//! released in a *different* call (`enter`/`exit`, `map`/`unmap`,
//! bind/rebind), sometimes re-entrantly from the same thread. `Monitor`
//! implements exactly that: an owner thread, a recursion depth, and a wait
//! queue for everyone else.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A re-entrant, explicitly released lock.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    available: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Monitor {
            state: Mutex::new(MonitorState::default()),
            available: Condvar::new(),
        }
    }

    /// Blocks until the calling thread owns the monitor. Re-entrant.
    pub fn enter(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
            return;
        }
        while state.owner.is_some() {
            self.available.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = 1;
    }

    /// Acquires the monitor only if that does not require blocking.
    pub fn try_enter(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
            return true;
        }
        if state.owner.is_none() {
            state.owner = Some(me);
            state.depth = 1;
            return true;
        }
        false
    }

    /// Releases one level of ownership.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the monitor. Matching
    /// enter/exit pairs are a structural property of the call sites in this
    /// crate, so an unbalanced exit is a programming error, not a runtime
    /// condition.
    pub fn exit(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(me),
            "monitor exited by a thread that does not own it"
        );
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.available.notify_one();
        }
    }

    /// Whether the calling thread currently owns the monitor.
    pub fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.state.lock().owner == Some(me)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn reentrant_same_thread() {
        let m = Monitor::new();
        m.enter();
        m.enter();
        assert!(m.is_held_by_current_thread());
        m.exit();
        assert!(m.is_held_by_current_thread());
        m.exit();
        assert!(!m.is_held_by_current_thread());
    }

    #[test]
    fn try_enter_fails_cross_thread() {
        let m = Arc::new(Monitor::new());
        m.enter();
        let m2 = m.clone();
        let handle = std::thread::spawn(move || m2.try_enter());
        assert!(!handle.join().unwrap());
        m.exit();
    }

    #[test]
    fn blocks_until_released() {
        let m = Arc::new(Monitor::new());
        let hits = Arc::new(AtomicU32::new(0));
        m.enter();
        let (m2, hits2) = (m.clone(), hits.clone());
        let handle = std::thread::spawn(move || {
            m2.enter();
            hits2.fetch_add(1, Ordering::SeqCst);
            m2.exit();
        });
        // The spawned thread must not get through while we hold the lock.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        m.exit();
        handle.join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic]
    fn unbalanced_exit_panics() {
        let m = Monitor::new();
        m.exit();
    }
}
