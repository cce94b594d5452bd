//! Per-thread scope trees and the process-wide aggregate.
//!
//! Each thread records into its own lazily created tree without taking any
//! lock. When the thread exits, the thread-local destructor merges that tree
//! into the global tree under a re-entrant lock.
//!
//! The main thread's thread-locals are not destroyed at process exit, so its
//! measurements only reach the global tree through `flush()`. The same goes for
//! pool workers that outlive the point where the report is read.

use std::cell::{Ref, RefCell, RefMut};
use std::marker::PhantomData;
use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, warn};

use crate::guard::{ScopeGuard, TreeAccess};
use crate::tree::ScopeTree;

type SharedTree = ReentrantMutex<RefCell<ScopeTree>>;

/// Process-wide tree. Initialised on first access, never torn down.
static GLOBAL: OnceLock<SharedTree> = OnceLock::new();

fn shared() -> &'static SharedTree {
    GLOBAL.get_or_init(|| ReentrantMutex::new(RefCell::new(ScopeTree::new())))
}

struct ThreadTree {
    tree: RefCell<ScopeTree>,
}

impl Drop for ThreadTree {
    fn drop(&mut self) {
        let tree = self.tree.get_mut();
        if !tree.is_empty() && !merge_into_global(tree) {
            warn!("global scope tree is borrowed during thread exit; measurements dropped");
        }
    }
}

thread_local! {
    static LOCAL: ThreadTree = ThreadTree {
        tree: RefCell::new(ScopeTree::new()),
    };
}

/// Returns false when the global tree is borrowed on this thread and nothing
/// was merged.
fn merge_into_global(local: &ScopeTree) -> bool {
    let shared = shared().lock();
    let merged = match shared.try_borrow_mut() {
        Ok(mut global) => {
            global.merge(local);
            true
        }
        Err(_) => false,
    };
    if merged {
        debug!(branches = local.len(), "merged thread scope tree into global tree");
    }
    merged
}

/// Accessor for the calling thread's own tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTree {
    _not_send: PhantomData<*const ()>,
}

impl LocalTree {
    pub fn current() -> Self {
        Self::default()
    }
}

impl TreeAccess for LocalTree {
    fn with_tree<R>(&self, f: impl FnOnce(&mut ScopeTree) -> R) -> Option<R> {
        LOCAL
            .try_with(|local| {
                let mut tree = local.tree.try_borrow_mut().ok()?;
                Some(f(&mut tree))
            })
            .ok()
            .flatten()
    }
}

/// Open `name` on the calling thread's tree, timed from now.
pub fn enter(name: &str) -> ScopeGuard<LocalTree> {
    enter_at(Instant::now(), name)
}

/// Open `name` on the calling thread's tree, timed from `start`.
pub fn enter_at(start: Instant, name: &str) -> ScopeGuard<LocalTree> {
    ScopeGuard::new(start, name, LocalTree::current())
}

/// Publish the calling thread's measurements to the global tree now.
///
/// Local counters are zeroed afterwards; branches and open guards are kept,
/// so activations still in progress are published by a later flush or by
/// thread exit. If this thread currently borrows the global tree through a
/// `GlobalTree` handle, nothing is merged and the local counters stay put.
pub fn flush() {
    let flushed = LOCAL.try_with(|local| {
        let Ok(mut tree) = local.tree.try_borrow_mut() else {
            warn!("thread scope tree is borrowed; flush skipped");
            return;
        };
        if tree.is_empty() {
            return;
        }
        if merge_into_global(&tree) {
            tree.clear_measurements();
        } else {
            warn!("global scope tree is borrowed on this thread; flush deferred");
        }
    });
    if flushed.is_err() {
        debug!("flush called during thread teardown; nothing to publish");
    }
}

/// Read a copy of the calling thread's own tree.
///
/// `f` runs on a snapshot, so guards opened or dropped inside it still reach
/// the live tree.
pub fn with_local_tree<R>(f: impl FnOnce(&ScopeTree) -> R) -> R {
    let snapshot = LOCAL.with(|local| local.tree.borrow().clone());
    f(&snapshot)
}

/// Reset the calling thread's tree. Guards still open on it become inert.
pub fn reset_local() {
    LOCAL.with(|local| local.tree.borrow_mut().reset());
}

/// Lock-scoped handle on the global tree.
///
/// Acquiring locks the global tree, dropping unlocks it. The lock is
/// re-entrant, so a thread may hold several handles at once; the `RefCell`
/// inside still enforces that only one of them borrows mutably.
pub struct GlobalTree {
    guard: ReentrantMutexGuard<'static, RefCell<ScopeTree>>,
}

impl GlobalTree {
    pub fn acquire() -> Self {
        Self {
            guard: shared().lock(),
        }
    }

    pub fn tree(&self) -> Ref<'_, ScopeTree> {
        self.guard.borrow()
    }

    pub fn tree_mut(&self) -> RefMut<'_, ScopeTree> {
        self.guard.borrow_mut()
    }
}

/// Lock the global tree for the lifetime of the returned handle.
pub fn global_tree() -> GlobalTree {
    GlobalTree::acquire()
}

/// Clear the global tree. Contributions from threads still running arrive
/// later as usual.
pub fn reset_global() {
    global_tree().tree_mut().reset();
    debug!("global scope tree reset");
}
