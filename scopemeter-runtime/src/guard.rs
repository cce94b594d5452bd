//! RAII scope guard.
//!
//! Construction pushes the scope onto a tree's active-path stack; dropping
//! the guard (on any exit path, unwinding included) pops it and records the
//! activation. The time spent inside the guard's own bookkeeping is recorded
//! separately as chore so that it can be subtracted from real time.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use crate::tree::{BranchId, ScopeTree};

/// The tree a guard records into.
///
/// Returns `None` when the tree cannot be reached (already torn down, or
/// currently borrowed); the guard then records nothing.
pub trait TreeAccess {
    fn with_tree<R>(&self, f: impl FnOnce(&mut ScopeTree) -> R) -> Option<R>;
}

impl TreeAccess for &RefCell<ScopeTree> {
    fn with_tree<R>(&self, f: impl FnOnce(&mut ScopeTree) -> R) -> Option<R> {
        let mut tree = self.try_borrow_mut().ok()?;
        Some(f(&mut tree))
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenBranch {
    id: BranchId,
    generation: u64,
}

/// Measures one activation of a named scope.
///
/// Guards must be dropped in reverse order of creation. Neither accessor
/// implementation is `Send`, so a guard always closes on the thread that
/// opened it.
#[must_use = "dropping the guard immediately records an empty scope; bind it with `let _guard = ...`"]
pub struct ScopeGuard<A: TreeAccess> {
    access: A,
    start: Instant,
    open: Option<OpenBranch>,
    entry_chore: Duration,
}

impl<A: TreeAccess> ScopeGuard<A> {
    /// Open `name` on the tree behind `access`. `start` should be captured by
    /// the caller immediately before this call so the push is timed as chore.
    pub fn new(start: Instant, name: &str, access: A) -> Self {
        let open = access.with_tree(|tree| OpenBranch {
            id: tree.stack_push(name),
            generation: tree.generation(),
        });
        let entry_chore = start.elapsed();
        Self {
            access,
            start,
            open,
            entry_chore,
        }
    }

    /// Branch this guard records into, if the tree was reachable.
    pub fn branch(&self) -> Option<BranchId> {
        self.open.map(|open| open.id)
    }
}

/// Measured time runs from `start` until the pop and record are done, not
/// just until `end`. The exit bookkeeping therefore sits inside the measured
/// span as well as in the chore, which keeps measured time at or above the
/// branch chore and real time free of saturation.
impl<A: TreeAccess> Drop for ScopeGuard<A> {
    fn drop(&mut self) {
        let end = Instant::now();
        let Some(open) = self.open else {
            return;
        };
        let start = self.start;
        let entry_chore = self.entry_chore;

        let recorded = self.access.with_tree(|tree| {
            if tree.generation() != open.generation {
                return false;
            }
            let popped = tree.stack_pop();
            debug_assert_eq!(
                popped, open.id,
                "scope guards must be dropped in reverse order of creation"
            );
            let done = Instant::now();
            tree.record_activation(
                open.id,
                done.duration_since(start),
                entry_chore + done.duration_since(end),
            );
            true
        });

        match recorded {
            Some(true) => {}
            Some(false) => tracing::warn!(
                branch = ?open.id,
                "scope guard outlived a reset of its tree; activation discarded"
            ),
            None => tracing::warn!(
                branch = ?open.id,
                "scope tree unreachable when closing a scope; branch left open"
            ),
        }
    }
}
