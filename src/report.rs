use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use scopemeter_runtime::render::{self, RenderOptions};
use scopemeter_runtime::{Branch, ScopeTree};

use crate::error::Error;

/// Text report selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportKind {
    /// Indented tree of real durations and call counts.
    Tree,
    /// Indented tree relative to each parent.
    Percentages,
    /// Flat totals per name, in name order.
    Totals,
    /// Flat totals, ascending by duration.
    ByDuration,
    /// Flat totals, ascending by call count.
    ByCalls,
}

impl ReportKind {
    pub fn title(self) -> &'static str {
        match self {
            ReportKind::Tree => "Call tree",
            ReportKind::Percentages => "Call tree (relative to parent)",
            ReportKind::Totals => "Totals",
            ReportKind::ByDuration => "Totals by duration",
            ReportKind::ByCalls => "Totals by call count",
        }
    }
}

/// Render one report.
pub fn render(kind: ReportKind, tree: &ScopeTree, options: &RenderOptions) -> String {
    match kind {
        ReportKind::Tree => render::branch_durations(tree, options),
        ReportKind::Percentages => render::branch_percentages(tree, options),
        ReportKind::Totals => render::totals_str(tree, options),
        ReportKind::ByDuration => render::totals_by_duration_str(tree, options),
        ReportKind::ByCalls => render::totals_by_call_count_str(tree, options),
    }
}

/// Render several reports, each under a heading.
pub fn render_all(kinds: &[ReportKind], tree: &ScopeTree, options: &RenderOptions) -> String {
    let mut out = String::new();
    for (i, kind) in kinds.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{}\n{}\n", kind.title(), "-".repeat(kind.title().len())));
        out.push_str(&render(*kind, tree, options));
    }
    out
}

/// Which CSV export to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// `Function Name,Time (s),Call Number`, name order.
    Totals,
    /// `Time (s),Call Number,Function Name`, ascending duration.
    ByDuration,
}

pub fn write_csv(
    path: &Path,
    layout: CsvLayout,
    tree: &ScopeTree,
    options: &RenderOptions,
) -> Result<(), Error> {
    let mut out = create(path)?;
    let written = match layout {
        CsvLayout::Totals => render::write_totals_csv(tree, &mut out, options),
        CsvLayout::ByDuration => render::write_totals_by_duration_csv(tree, &mut out, options),
    };
    written
        .and_then(|()| out.flush())
        .map_err(|source| Error::WriteOutput {
            path: path.to_path_buf(),
            source,
        })
}

/// Serializable copy of one branch and its subtree. Durations in seconds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BranchSnapshot {
    pub name: String,
    pub calls: u64,
    pub measured_s: f64,
    pub node_chore_s: f64,
    pub real_s: f64,
    pub real_node_s: f64,
    pub children: Vec<BranchSnapshot>,
}

impl BranchSnapshot {
    pub fn capture(branch: Branch<'_>) -> Self {
        Self {
            name: branch.name().to_owned(),
            calls: branch.call_count(),
            measured_s: branch.measured_duration().as_secs_f64(),
            node_chore_s: branch.node_chore_duration().as_secs_f64(),
            real_s: branch.real_duration().as_secs_f64(),
            real_node_s: branch.real_node_duration().as_secs_f64(),
            children: branch.children().map(BranchSnapshot::capture).collect(),
        }
    }
}

/// Write the whole tree as pretty-printed JSON.
pub fn write_json(path: &Path, tree: &ScopeTree) -> Result<(), Error> {
    let snapshot = BranchSnapshot::capture(tree.root());
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, &snapshot)?;
    writeln!(out)
        .and_then(|()| out.flush())
        .map_err(|source| Error::WriteOutput {
            path: path.to_path_buf(),
            source,
        })
}

fn create(path: &Path) -> Result<BufWriter<File>, Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::CreateOutput {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| Error::CreateOutput {
            path: path.to_path_buf(),
            source,
        })
}
