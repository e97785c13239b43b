//! Per-thread construction stack used for cycle detection
//!
//! Resolution never suspends, so one resolve call path always stays on one
//! thread and a thread-local stack is a faithful per-call-path stack.
//! Frames are tagged with the owning container so nested resolutions across
//! two containers do not see each other's keys.

use crate::Key;
use std::cell::RefCell;

#[derive(Clone, Copy, PartialEq, Eq)]
struct Frame {
    container: usize,
    key: Key,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// RAII frame: pushed on creation, popped on drop (including unwinding).
pub(crate) struct StackGuard {
    frame: Frame,
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|f| *f == self.frame) {
                stack.remove(pos);
            }
        });
    }
}

/// Push `key` for `container` onto the current thread's stack.
pub(crate) fn enter(container: usize, key: Key) -> StackGuard {
    let frame = Frame { container, key };
    STACK.with(|stack| stack.borrow_mut().push(frame));
    StackGuard { frame }
}

/// Is `key` currently under construction on this call path?
pub(crate) fn contains(container: usize, key: Key) -> bool {
    STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|f| f.container == container && f.key == key)
    })
}

/// The cycle closed by re-entering `key`: from its first frame to the top,
/// followed by `key` itself.
pub(crate) fn cycle(container: usize, key: Key) -> Vec<Key> {
    STACK.with(|stack| {
        let stack = stack.borrow();
        let mine: Vec<Key> = stack
            .iter()
            .filter(|f| f.container == container)
            .map(|f| f.key)
            .collect();
        let start = mine.iter().position(|k| *k == key).unwrap_or(0);
        let mut chain = mine[start..].to_vec();
        chain.push(key);
        chain
    })
}

/// Keys on this thread's stack for `container`, bottom first
#[cfg_attr(not(feature = "logging"), allow(dead_code))]
pub(crate) fn snapshot(container: usize) -> Vec<Key> {
    STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .filter(|f| f.container == container)
            .map(|f| f.key)
            .collect()
    })
}
