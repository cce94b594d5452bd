//! Call-tree scope profiler runtime.
//!
//! Put `scope_fn!()` (or `scope!("name")`) at the top of a block to time it.
//! Each thread builds its own tree of named scopes without locking; when the
//! thread exits its tree is merged into a process-wide tree, which reports are
//! rendered from:
//!
//! ```
//! fn work() {
//!     scopemeter_runtime::scope_fn!();
//!     // ...
//! }
//!
//! work();
//! scopemeter_runtime::flush();
//! let global = scopemeter_runtime::global_tree();
//! let text = scopemeter_runtime::render::branch_durations(
//!     &global.tree(),
//!     &Default::default(),
//! );
//! # let _ = text;
//! ```
//!
//! Building without the default `enabled` feature turns both macros into
//! no-ops.

mod guard;
mod registry;
pub mod render;
mod tree;

pub use guard::{ScopeGuard, TreeAccess};
pub use registry::{
    enter, enter_at, flush, global_tree, reset_global, reset_local, with_local_tree, GlobalTree,
    LocalTree,
};
pub use render::RenderOptions;
pub use tree::{Branch, BranchId, CallCountRanking, DurationRanking, ScopeTree, Totals, BODY_NAME};

/// Time the rest of the enclosing block as scope `$name` on the calling
/// thread's tree.
#[cfg(feature = "enabled")]
#[macro_export]
macro_rules! scope {
    ($name:expr) => {
        let _scopemeter_guard = $crate::enter_at(::std::time::Instant::now(), $name);
    };
}

/// Instrumentation disabled: expands to nothing.
#[cfg(not(feature = "enabled"))]
#[macro_export]
macro_rules! scope {
    ($name:expr) => {};
}

/// Time the rest of the enclosing function under its own name.
#[macro_export]
macro_rules! scope_fn {
    () => {
        $crate::scope!($crate::function_name!());
    };
}

/// Name of the enclosing function, without module path. Closures resolve to
/// the function they are defined in.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __scopemeter_here() {}
        fn __scopemeter_type_name<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::__short_fn_name(__scopemeter_type_name(__scopemeter_here))
    }};
}

#[doc(hidden)]
pub fn __short_fn_name(full: &'static str) -> &'static str {
    let mut name = full.strip_suffix("::__scopemeter_here").unwrap_or(full);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name.rsplit("::").next().unwrap_or(name)
}
