//! Text and CSV reports over a scope tree.
//!
//! All functions are read-only traversals. Durations are real durations
//! (chore removed) printed in seconds. Tree reports list children in ascending
//! real-duration order and add a `<body>` line for the parent's own time
//! whenever the parent has children and a nonzero measured duration.

use std::io;
use std::time::Duration;

use crate::tree::{Branch, Derived, ScopeTree, BODY_NAME};

/// Formatting knobs shared by every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Spaces per nesting level in tree reports.
    pub indent_width: usize,
    /// Decimal places for seconds.
    pub precision: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            precision: 6,
        }
    }
}

struct Line<'a> {
    name: &'a str,
    real: Duration,
    calls: u64,
    branch: Option<Branch<'a>>,
}

/// Children of `parent` plus its `<body>` line, ascending by real duration.
/// `derived` holds the tree's per-branch durations, indexed by branch id.
fn sorted_lines<'a>(parent: Branch<'a>, derived: &[Derived]) -> Vec<Line<'a>> {
    let mut lines: Vec<Line<'a>> = parent
        .children()
        .map(|child| Line {
            name: child.name(),
            real: derived[child.id().index()].real,
            calls: child.call_count(),
            branch: Some(child),
        })
        .collect();

    if parent.has_children() && !parent.measured_duration().is_zero() {
        lines.push(Line {
            name: BODY_NAME,
            real: derived[parent.id().index()].real_node,
            calls: parent.call_count(),
            branch: None,
        });
    }

    lines.sort_by(|a, b| (a.real, a.name).cmp(&(b.real, b.name)));
    lines
}

fn indent(out: &mut String, depth: usize, options: &RenderOptions) {
    out.push_str(&" ".repeat(depth * options.indent_width));
}

fn secs(duration: Duration, options: &RenderOptions) -> String {
    format!("{:.*}", options.precision, duration.as_secs_f64())
}

/// Indented tree: `"<secs>s /#<calls> - <name>"` per branch.
pub fn branch_durations(tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    durations_into(&mut out, tree.root(), &tree.derived(), 0, options);
    out
}

fn durations_into(
    out: &mut String,
    parent: Branch<'_>,
    derived: &[Derived],
    depth: usize,
    options: &RenderOptions,
) {
    for line in sorted_lines(parent, derived) {
        indent(out, depth, options);
        out.push_str(&format!(
            "{}s /#{} - {}\n",
            secs(line.real, options),
            line.calls,
            line.name
        ));
        if let Some(child) = line.branch {
            durations_into(out, child, derived, depth + 1, options);
        }
    }
}

/// Indented tree relative to each parent.
///
/// Each line shows the share of the parent's real duration (`"<pct>%"`, or
/// absolute `"<secs>s"` when the parent has none) and the call ratio to the
/// parent (`"^<ratio>"`, or absolute `"#<calls>"` when the parent has no
/// calls).
pub fn branch_percentages(tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    percentages_into(&mut out, tree.root(), &tree.derived(), 0, options);
    out
}

fn percentages_into(
    out: &mut String,
    parent: Branch<'_>,
    derived: &[Derived],
    depth: usize,
    options: &RenderOptions,
) {
    let parent_real = derived[parent.id().index()].real;
    let parent_calls = parent.call_count();

    for line in sorted_lines(parent, derived) {
        let share = if parent_real.is_zero() {
            format!("{}s", secs(line.real, options))
        } else {
            format!(
                "{:.2}%",
                line.real.as_secs_f64() / parent_real.as_secs_f64() * 100.0
            )
        };
        let count = if parent_calls == 0 {
            format!("#{}", line.calls)
        } else {
            format!("^{:.2}", line.calls as f64 / parent_calls as f64)
        };

        indent(out, depth, options);
        out.push_str(&format!("{share} {count} - {}\n", line.name));
        if let Some(child) = line.branch {
            percentages_into(out, child, derived, depth + 1, options);
        }
    }
}

/// One line per distinct name in name order: `"<name>: <secs>s /#<calls>"`.
pub fn totals_str(tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    for (name, totals) in tree.totals() {
        out.push_str(&format!(
            "{name}: {}s /#{}\n",
            secs(totals.duration, options),
            totals.calls
        ));
    }
    out
}

/// Totals ascending by duration: `"<secs>s /#<calls> - <name>"`.
pub fn totals_by_duration_str(tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    for (duration, name, calls) in tree.totals_by_duration() {
        out.push_str(&format!("{}s /#{calls} - {name}\n", secs(duration, options)));
    }
    out
}

/// Totals ascending by call count: `"#<calls> <secs>s - <name>"`.
pub fn totals_by_call_count_str(tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    for (calls, name, duration) in tree.totals_by_call_count() {
        out.push_str(&format!("#{calls} {}s - {name}\n", secs(duration, options)));
    }
    out
}

pub fn write_branch_durations<W: io::Write>(
    tree: &ScopeTree,
    out: &mut W,
    options: &RenderOptions,
) -> io::Result<()> {
    out.write_all(branch_durations(tree, options).as_bytes())
}

pub fn write_branch_percentages<W: io::Write>(
    tree: &ScopeTree,
    out: &mut W,
    options: &RenderOptions,
) -> io::Result<()> {
    out.write_all(branch_percentages(tree, options).as_bytes())
}

/// CSV of totals in name order. Names are written verbatim; callers must keep
/// commas and newlines out of scope names.
pub fn write_totals_csv<W: io::Write>(
    tree: &ScopeTree,
    out: &mut W,
    options: &RenderOptions,
) -> io::Result<()> {
    writeln!(out, "Function Name,Time (s),Call Number")?;
    for (name, totals) in tree.totals() {
        writeln!(
            out,
            "{name},{},{}",
            secs(totals.duration, options),
            totals.calls
        )?;
    }
    Ok(())
}

/// CSV of totals ascending by duration.
pub fn write_totals_by_duration_csv<W: io::Write>(
    tree: &ScopeTree,
    out: &mut W,
    options: &RenderOptions,
) -> io::Result<()> {
    writeln!(out, "Time (s),Call Number,Function Name")?;
    for (duration, name, calls) in tree.totals_by_duration() {
        writeln!(out, "{},{calls},{name}", secs(duration, options))?;
    }
    Ok(())
}
