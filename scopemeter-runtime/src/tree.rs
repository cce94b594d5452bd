//! Scope tree: named branches with duration, chore, and call-count bookkeeping.
//!
//! Branches live in an arena owned by the tree and are addressed by a
//! copyable `BranchId`. Every branch aggregates all activations recorded at its
//! position: measured wall time, the time the profiler spent on its own
//! push/pop bookkeeping ("chore"), and the number of completed activations.
//!
//! Real time is derived, never stored. A branch's measured interval contains
//! the intervals of all its descendants, so their chore is contained too;
//! `real_duration` therefore subtracts the chore of the whole subtree, not just
//! the node's own. `real_node_duration` additionally removes the children's
//! real time, leaving the time spent in the branch's own body.
//!
//! The active-path stack tracks currently open activations on the owning
//! thread. The root is always at the bottom and can never be popped.
//!
//! Arena invariant: a child is always allocated after its parent, so child ids
//! are strictly greater than their parent's id. Bottom-up passes rely on this.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Name of the synthetic entry holding a branch's own (childless) real time.
pub const BODY_NAME: &str = "<body>";

/// Handle to a branch inside one `ScopeTree`.
///
/// Ids are only meaningful for the tree that produced them, and only until
/// that tree is `reset()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(usize);

impl BranchId {
    /// The unnamed root branch present in every tree.
    pub const ROOT: BranchId = BranchId(0);

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    name: String,
    children: BTreeMap<String, BranchId>,
    measured: Duration,
    node_chore: Duration,
    calls: u64,
}

/// Aggregated result for one scope name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Totals {
    /// Summed real duration.
    pub duration: Duration,
    /// Summed call count.
    pub calls: u64,
}

impl Totals {
    fn add(&mut self, duration: Duration, calls: u64) {
        self.duration += duration;
        self.calls += calls;
    }
}

/// Totals ordered by duration ascending, then name, then call count.
pub type DurationRanking = BTreeSet<(Duration, String, u64)>;

/// Totals ordered by call count ascending, then name, then duration.
pub type CallCountRanking = BTreeSet<(u64, String, Duration)>;

/// Per-branch durations that depend on the whole subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Derived {
    pub(crate) branch_chore: Duration,
    pub(crate) real: Duration,
    pub(crate) real_node: Duration,
}

/// Tree of named scopes plus the stack of currently open activations.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: Vec<Node>,
    stack: Vec<BranchId>,
    generation: u64,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            stack: vec![BranchId::ROOT],
            generation: 0,
        }
    }

    pub fn root(&self) -> Branch<'_> {
        self.branch(BranchId::ROOT)
    }

    /// Read view of a branch.
    ///
    /// Panics if `id` was not produced by this tree (or predates a reset that
    /// shrank it).
    pub fn branch(&self, id: BranchId) -> Branch<'_> {
        assert!(
            id.index() < self.nodes.len(),
            "branch id {} does not belong to this scope tree",
            id.index()
        );
        Branch { tree: self, id }
    }

    /// Number of branches, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Bumped by every `reset()`; guards use it to detect that the branch they
    /// opened no longer exists.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Child of `parent` keyed by `name`, created with zeroed counters if absent.
    pub fn existing_or_new_branch(&mut self, parent: BranchId, name: &str) -> BranchId {
        if let Some(&id) = self.nodes[parent.index()].children.get(name) {
            return id;
        }
        let id = BranchId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_owned(),
            ..Node::default()
        });
        self.nodes[parent.index()]
            .children
            .insert(name.to_owned(), id);
        id
    }

    /// Open `name` under the current top of the active-path stack.
    pub fn stack_push(&mut self, name: &str) -> BranchId {
        let id = self.existing_or_new_branch(self.top(), name);
        self.stack.push(id);
        id
    }

    /// Close the current top of the active-path stack and return it.
    ///
    /// Popping the root is a programming error and panics.
    pub fn stack_pop(&mut self) -> BranchId {
        assert!(
            self.stack.len() > 1,
            "scope tree stack underflow: the root branch cannot be popped"
        );
        self.stack.pop().unwrap_or(BranchId::ROOT)
    }

    /// Currently open activations, root first.
    pub fn stack(&self) -> &[BranchId] {
        &self.stack
    }

    /// Innermost open activation (the root when nothing is open).
    pub fn top(&self) -> BranchId {
        self.stack.last().copied().unwrap_or(BranchId::ROOT)
    }

    /// Add one completed activation to `id`.
    pub fn record_activation(&mut self, id: BranchId, measured: Duration, chore: Duration) {
        let node = &mut self.nodes[id.index()];
        node.measured += measured;
        node.node_chore += chore;
        node.calls += 1;
    }

    /// Add every branch of `other` into the branch at the same name path.
    pub fn merge(&mut self, other: &ScopeTree) {
        self.merge_branch(BranchId::ROOT, other, BranchId::ROOT);
    }

    fn merge_branch(&mut self, target: BranchId, other: &ScopeTree, source: BranchId) {
        let from = &other.nodes[source.index()];
        let into = &mut self.nodes[target.index()];
        into.measured += from.measured;
        into.node_chore += from.node_chore;
        into.calls += from.calls;

        for (name, &child) in &from.children {
            let target_child = self.existing_or_new_branch(target, name);
            self.merge_branch(target_child, other, child);
        }
    }

    /// Back to a freshly constructed tree. Guards opened before the reset
    /// become inert.
    pub fn reset(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self::new();
        self.generation = generation;
    }

    /// Zero every counter but keep branches and the active-path stack, so
    /// guards that are still open close normally afterwards.
    pub fn clear_measurements(&mut self) {
        for node in &mut self.nodes {
            node.measured = Duration::ZERO;
            node.node_chore = Duration::ZERO;
            node.calls = 0;
        }
    }

    /// Totals per scope name, summed over every position the name occurs at.
    ///
    /// Branches with children and a nonzero measured duration also contribute
    /// their own body time to the `BODY_NAME` entry.
    pub fn totals(&self) -> BTreeMap<String, Totals> {
        let derived = self.derived();
        let mut totals: BTreeMap<String, Totals> = BTreeMap::new();

        for (index, node) in self.nodes.iter().enumerate().skip(1) {
            totals
                .entry(node.name.clone())
                .or_default()
                .add(derived[index].real, node.calls);

            if !node.children.is_empty() && !node.measured.is_zero() {
                totals
                    .entry(BODY_NAME.to_owned())
                    .or_default()
                    .add(derived[index].real_node, node.calls);
            }
        }
        totals
    }

    pub fn totals_by_duration(&self) -> DurationRanking {
        self.totals()
            .into_iter()
            .map(|(name, t)| (t.duration, name, t.calls))
            .collect()
    }

    pub fn totals_by_call_count(&self) -> CallCountRanking {
        self.totals()
            .into_iter()
            .map(|(name, t)| (t.calls, name, t.duration))
            .collect()
    }

    /// Derived durations for every branch in one bottom-up pass, indexed by
    /// `BranchId`.
    pub(crate) fn derived(&self) -> Vec<Derived> {
        let mut out = vec![Derived::default(); self.nodes.len()];
        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            let mut branch_chore = node.node_chore;
            let mut children_real = Duration::ZERO;
            for child in node.children.values() {
                branch_chore += out[child.index()].branch_chore;
                children_real += out[child.index()].real;
            }
            let real = node.measured.saturating_sub(branch_chore);
            out[index] = Derived {
                branch_chore,
                real,
                real_node: real.saturating_sub(children_real),
            };
        }
        out
    }
}

/// Structural equality: names, counters, and children. Arena layout, the
/// active-path stack, and the generation are ignored.
impl PartialEq for ScopeTree {
    fn eq(&self, other: &Self) -> bool {
        same_branch(self.root(), other.root())
    }
}

fn same_branch(a: Branch<'_>, b: Branch<'_>) -> bool {
    let (x, y) = (a.node(), b.node());
    x.measured == y.measured
        && x.node_chore == y.node_chore
        && x.calls == y.calls
        && x.children.len() == y.children.len()
        && a
            .children()
            .zip(b.children())
            .all(|(ca, cb)| ca.name() == cb.name() && same_branch(ca, cb))
}

/// Borrowed view of one branch.
#[derive(Clone, Copy)]
pub struct Branch<'a> {
    tree: &'a ScopeTree,
    id: BranchId,
}

impl<'a> Branch<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.id.index()]
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    /// Scope name; empty for the root.
    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn is_root(&self) -> bool {
        self.id == BranchId::ROOT
    }

    pub fn measured_duration(&self) -> Duration {
        self.node().measured
    }

    pub fn node_chore_duration(&self) -> Duration {
        self.node().node_chore
    }

    pub fn call_count(&self) -> u64 {
        self.node().calls
    }

    pub fn has_children(&self) -> bool {
        !self.node().children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<Branch<'a>> {
        let tree = self.tree;
        self.node()
            .children
            .get(name)
            .map(|&id| Branch { tree, id })
    }

    /// Follow a path of names downwards from this branch.
    pub fn descendant(&self, path: &[&str]) -> Option<Branch<'a>> {
        path.iter()
            .try_fold(*self, |branch, name| branch.child(name))
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = Branch<'a>> + 'a {
        let tree = self.tree;
        self.node()
            .children
            .values()
            .map(move |&id| Branch { tree, id })
    }

    /// Own chore plus the chore of every descendant.
    pub fn branch_chore_duration(&self) -> Duration {
        self.node_chore_duration()
            + self
                .children()
                .map(|c| c.branch_chore_duration())
                .sum::<Duration>()
    }

    /// Measured time minus all profiler bookkeeping inside this subtree.
    pub fn real_duration(&self) -> Duration {
        self.measured_duration()
            .saturating_sub(self.branch_chore_duration())
    }

    /// Real time not spent inside instrumented children.
    pub fn real_node_duration(&self) -> Duration {
        let children: Duration = self.children().map(|c| c.real_duration()).sum();
        self.real_duration().saturating_sub(children)
    }
}

impl fmt::Debug for Branch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name())
            .field("measured", &self.measured_duration())
            .field("node_chore", &self.node_chore_duration())
            .field("calls", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Open `path` from the root, record one activation on its last element,
    /// then close everything again.
    fn record(tree: &mut ScopeTree, path: &[&str], measured: Duration, chore: Duration) {
        for name in path {
            tree.stack_push(name);
        }
        let id = tree.top();
        tree.record_activation(id, measured, chore);
        for _ in path {
            tree.stack_pop();
        }
    }

    #[test]
    fn existing_or_new_branch_reuses_by_name() {
        let mut tree = ScopeTree::new();
        let a = tree.existing_or_new_branch(BranchId::ROOT, "parse");
        let b = tree.existing_or_new_branch(BranchId::ROOT, "parse");
        let c = tree.existing_or_new_branch(BranchId::ROOT, "lex");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.branch(a).name(), "parse");
        assert_eq!(tree.branch(a).call_count(), 0);
    }

    #[test]
    fn push_and_pop_follow_the_active_path() {
        let mut tree = ScopeTree::new();
        assert_eq!(tree.stack(), &[BranchId::ROOT]);

        let outer = tree.stack_push("outer");
        let inner = tree.stack_push("inner");
        assert_eq!(tree.stack(), &[BranchId::ROOT, outer, inner]);
        assert_eq!(tree.root().descendant(&["outer", "inner"]).unwrap().id(), inner);

        assert_eq!(tree.stack_pop(), inner);
        assert_eq!(tree.stack_pop(), outer);
        assert_eq!(tree.stack(), &[BranchId::ROOT]);

        // Same name under the same parent resolves to the same branch.
        assert_eq!(tree.stack_push("outer"), outer);
        tree.stack_pop();
    }

    #[test]
    fn recursion_collapses_into_nested_branches_by_name() {
        let mut tree = ScopeTree::new();
        let first = tree.stack_push("fib");
        let second = tree.stack_push("fib");
        assert_ne!(first, second, "recursion nests one level per depth");
        tree.stack_pop();
        tree.stack_pop();
        let again = tree.stack_push("fib");
        assert_eq!(again, first);
        tree.stack_pop();
    }

    #[test]
    #[should_panic(expected = "root branch cannot be popped")]
    fn popping_the_root_panics() {
        let mut tree = ScopeTree::new();
        tree.stack_pop();
    }

    #[test]
    fn record_activation_accumulates() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["work"], ms(10), ms(1));
        record(&mut tree, &["work"], ms(12), ms(1));
        let work = tree.root().child("work").unwrap();
        assert_eq!(work.call_count(), 2);
        assert_eq!(work.measured_duration(), ms(22));
        assert_eq!(work.node_chore_duration(), ms(2));
        assert_eq!(work.real_duration(), ms(20));
    }

    #[test]
    fn chore_of_descendants_is_removed_from_ancestors() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["a", "b", "c"], ms(10), ms(2));
        record(&mut tree, &["a", "b"], ms(20), ms(1));
        record(&mut tree, &["a"], ms(40), ms(1));

        let a = tree.root().child("a").unwrap();
        let b = a.child("b").unwrap();
        let c = b.child("c").unwrap();

        assert_eq!(c.branch_chore_duration(), ms(2));
        assert_eq!(b.branch_chore_duration(), ms(3));
        assert_eq!(a.branch_chore_duration(), ms(4));

        assert_eq!(c.real_duration(), ms(8));
        assert_eq!(b.real_duration(), ms(17));
        assert_eq!(a.real_duration(), ms(36));

        assert_eq!(a.real_node_duration(), ms(19));
        assert_eq!(b.real_node_duration(), ms(9));
        assert_eq!(c.real_node_duration(), ms(8));

        for branch in [a, b, c] {
            assert!(branch.measured_duration() >= branch.branch_chore_duration());
            assert!(branch.branch_chore_duration() >= branch.node_chore_duration());
        }
    }

    #[test]
    fn real_duration_saturates_instead_of_underflowing() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["tiny"], ms(1), ms(3));
        let tiny = tree.root().child("tiny").unwrap();
        assert_eq!(tiny.real_duration(), Duration::ZERO);
        assert_eq!(tiny.real_node_duration(), Duration::ZERO);
    }

    #[test]
    fn merge_adds_matching_paths_and_creates_missing_ones() {
        let mut left = ScopeTree::new();
        record(&mut left, &["task"], ms(3), ms(1));
        record(&mut left, &["task", "io"], ms(1), Duration::ZERO);

        let mut right = ScopeTree::new();
        record(&mut right, &["task"], ms(5), ms(1));
        record(&mut right, &["task", "cpu"], ms(2), Duration::ZERO);

        left.merge(&right);
        let task = left.root().child("task").unwrap();
        assert_eq!(task.call_count(), 2);
        assert_eq!(task.measured_duration(), ms(8));
        assert_eq!(task.node_chore_duration(), ms(2));
        assert_eq!(task.child("io").unwrap().call_count(), 1);
        assert_eq!(task.child("cpu").unwrap().measured_duration(), ms(2));
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let mut t1 = ScopeTree::new();
        record(&mut t1, &["a"], ms(1), ms(1));
        record(&mut t1, &["a", "x"], ms(1), Duration::ZERO);
        let mut t2 = ScopeTree::new();
        record(&mut t2, &["b"], ms(2), Duration::ZERO);
        record(&mut t2, &["a", "y"], ms(4), ms(1));
        let mut t3 = ScopeTree::new();
        record(&mut t3, &["a", "x"], ms(7), ms(2));
        record(&mut t3, &["c", "a"], ms(3), Duration::ZERO);

        let mut left = ScopeTree::new();
        left.merge(&t1);
        left.merge(&t2);
        left.merge(&t3);

        let mut grouped = t2.clone();
        grouped.merge(&t3);
        let mut right = ScopeTree::new();
        right.merge(&grouped);
        right.merge(&t1);

        let mut reversed = ScopeTree::new();
        reversed.merge(&t3);
        reversed.merge(&t1);
        reversed.merge(&t2);

        assert_eq!(left, right);
        assert_eq!(left, reversed);
        assert_ne!(left, t1);
    }

    #[test]
    fn reset_restores_fresh_state_and_bumps_generation() {
        let mut tree = ScopeTree::new();
        tree.stack_push("open");
        record(&mut tree, &["done"], ms(1), Duration::ZERO);
        let before = tree.generation();

        tree.reset();
        assert!(tree.is_empty());
        assert_eq!(tree.stack(), &[BranchId::ROOT]);
        assert_eq!(tree.generation(), before + 1);
        assert_eq!(tree, ScopeTree::new());
    }

    #[test]
    fn clear_measurements_keeps_structure_and_open_stack() {
        let mut tree = ScopeTree::new();
        let open = tree.stack_push("open");
        record(&mut tree, &["done"], ms(4), ms(1));

        tree.clear_measurements();
        assert_eq!(tree.stack().last(), Some(&open));
        let done = tree.root().descendant(&["open", "done"]).unwrap();
        assert_eq!(done.call_count(), 0);
        assert_eq!(done.measured_duration(), Duration::ZERO);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn totals_sum_names_across_depths() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["parse"], ms(5), Duration::ZERO);
        record(&mut tree, &["main", "load", "parse"], ms(7), Duration::ZERO);
        record(&mut tree, &["main", "load"], ms(10), Duration::ZERO);
        record(&mut tree, &["main"], ms(12), Duration::ZERO);

        let totals = tree.totals();
        assert_eq!(
            totals["parse"],
            Totals {
                duration: ms(12),
                calls: 2
            }
        );
        assert_eq!(totals["load"].duration, ms(10));
        // main body: 12 - 10; load body: 10 - 7.
        assert_eq!(
            totals[BODY_NAME],
            Totals {
                duration: ms(5),
                calls: 2
            }
        );
        assert_eq!(totals.len(), 4);
    }

    #[test]
    fn leaves_contribute_no_body_entry() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["leaf"], ms(3), Duration::ZERO);
        assert!(!tree.totals().contains_key(BODY_NAME));
    }

    #[test]
    fn rankings_order_by_metric_then_name() {
        let mut tree = ScopeTree::new();
        record(&mut tree, &["b"], ms(2), Duration::ZERO);
        record(&mut tree, &["a"], ms(2), Duration::ZERO);
        record(&mut tree, &["c"], ms(1), Duration::ZERO);
        record(&mut tree, &["c"], Duration::ZERO, Duration::ZERO);

        let by_duration: Vec<String> = tree
            .totals_by_duration()
            .into_iter()
            .map(|(_, name, _)| name)
            .collect();
        assert_eq!(by_duration, ["c", "a", "b"]);

        let by_calls: Vec<(u64, String)> = tree
            .totals_by_call_count()
            .into_iter()
            .map(|(calls, name, _)| (calls, name))
            .collect();
        assert_eq!(
            by_calls,
            [(1, "a".to_owned()), (1, "b".to_owned()), (2, "c".to_owned())]
        );
    }
}
