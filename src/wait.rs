//! Cross-thread wait tracking for once-only construction cells
//!
//! Singleton, scoped and deferred cells are initialized by exactly one thread
//! while every other thread that reaches them blocks. A thread that is
//! initializing a cell owns it; a thread about to block records the cell it
//! is waiting for. Before blocking, a waiter follows the owner and waiting
//! links from its target. Arriving back at a cell it owns itself means the
//! wait would never end, and the waiter backs off instead.
//!
//! A thread always records its wait before following the links, and always
//! marks ownership before it can wait on anything else, so of the threads
//! that close a wait cycle at least the last one to check sees all of it.

use crate::Key;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::thread::{self, ThreadId};

struct Registry {
    /// Cell address -> thread initializing it, and the key it builds
    owners: DashMap<usize, (ThreadId, Key), RandomState>,
    /// Thread -> cell it is blocked on (or about to block on)
    waiting: DashMap<ThreadId, (usize, Key), RandomState>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
    owners: DashMap::with_hasher(RandomState::new()),
    waiting: DashMap::with_hasher(RandomState::new()),
});

/// Clears this thread's wait record on drop.
pub(crate) struct WaitGuard {
    thread: ThreadId,
    cell: usize,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        REGISTRY
            .waiting
            .remove_if(&self.thread, |_, (cell, _)| *cell == self.cell);
    }
}

/// Clears the ownership mark of a cell on drop.
pub(crate) struct OwnerGuard {
    cell: usize,
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        REGISTRY.owners.remove(&self.cell);
    }
}

/// Record that the current thread is about to block on `cell`, which holds `key`.
///
/// Returns the key chain of the wait cycle if blocking would never return.
pub(crate) fn wait_for(cell: usize, key: Key) -> Result<WaitGuard, Vec<Key>> {
    let me = thread::current().id();
    REGISTRY.waiting.insert(me, (cell, key));
    let guard = WaitGuard { thread: me, cell };
    match find_cycle(me, cell, key) {
        Some(chain) => Err(chain),
        None => Ok(guard),
    }
}

/// Mark `cell` as being initialized by the current thread.
///
/// Call from inside the cell's initializer.
pub(crate) fn own(cell: usize, key: Key) -> OwnerGuard {
    let me = thread::current().id();
    REGISTRY.waiting.remove_if(&me, |_, (waited, _)| *waited == cell);
    REGISTRY.owners.insert(cell, (me, key));
    OwnerGuard { cell }
}

fn find_cycle(me: ThreadId, mut cell: usize, mut key: Key) -> Option<Vec<Key>> {
    let mut chain = Vec::new();
    // Each hop moves to a distinct owner unless some other cycle exists
    for _ in 0..=REGISTRY.owners.len() {
        let (owner, owned) = *REGISTRY.owners.get(&cell)?;
        chain.push(key);
        if owner == me {
            chain.insert(0, owned);
            return Some(chain);
        }
        (cell, key) = *REGISTRY.waiting.get(&owner)?;
    }
    None
}

/// Address used to identify a cell
#[inline]
pub(crate) fn addr_of<C>(cell: &C) -> usize {
    cell as *const C as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct Left;
    struct Right;

    #[test]
    fn test_free_cell_does_not_block() {
        let cell = 0x10usize;
        assert!(wait_for(cell, Key::of::<Left>()).is_ok());
        assert!(REGISTRY.owners.get(&cell).is_none());
    }

    #[test]
    fn test_own_cell_is_a_cycle() {
        let cell = 0x20usize;
        let _owner = own(cell, Key::of::<Left>());
        let chain = wait_for(cell, Key::of::<Left>()).err().unwrap();
        assert_eq!(chain, vec![Key::of::<Left>(), Key::of::<Left>()]);
    }

    #[test]
    fn test_guards_clear_records() {
        let cell = 0x30usize;
        {
            let _waiting = wait_for(cell, Key::of::<Left>()).ok().unwrap();
            assert!(REGISTRY.waiting.contains_key(&thread::current().id()));
            let _owner = own(cell, Key::of::<Left>());
            assert!(!REGISTRY.waiting.contains_key(&thread::current().id()));
        }
        assert!(REGISTRY.owners.get(&cell).is_none());
    }

    #[test]
    fn test_two_thread_cycle_detected() {
        let (left_cell, right_cell) = (0x40usize, 0x50usize);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        // The other thread owns Right and waits on Left
        let other = thread::spawn(move || {
            let _owner = own(right_cell, Key::of::<Right>());
            let _waiting = wait_for(left_cell, Key::of::<Left>());
            ready_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        });

        let _owner = own(left_cell, Key::of::<Left>());
        ready_rx.recv().unwrap();
        let chain = wait_for(right_cell, Key::of::<Right>()).err().unwrap();
        assert_eq!(
            chain,
            vec![Key::of::<Left>(), Key::of::<Right>(), Key::of::<Left>()]
        );

        done_tx.send(()).unwrap();
        other.join().unwrap();
    }
}
