use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use scopemeter::error::Error;
use scopemeter::report::{CsvLayout, ReportKind, render_all, write_csv, write_json};
use scopemeter::workload;
use scopemeter_runtime::{RenderOptions, global_tree};

#[derive(Parser)]
#[command(
    name = "scopemeter",
    about = "Call-tree scope profiler",
    version,
    after_help = "Log filtering: SCOPEMETER_LOG=debug scopemeter run"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in instrumented workload and report the merged tree.
    Run {
        /// Worker threads, each running the workload once.
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Loop length inside each workload function.
        #[arg(long, default_value_t = 100_000)]
        count: u64,

        /// Report to print (repeatable). Defaults to by-duration, tree,
        /// percentages.
        #[arg(long = "report", value_enum, value_name = "KIND")]
        reports: Vec<ReportKind>,

        /// Spaces per nesting level in tree reports.
        #[arg(long, default_value_t = 4)]
        indent: usize,

        /// Decimal places for seconds.
        #[arg(long, default_value_t = 6)]
        precision: usize,

        /// Write totals in name order as CSV.
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Write totals ascending by duration as CSV.
        #[arg(long, value_name = "PATH")]
        csv_by_duration: Option<PathBuf>,

        /// Write the whole tree as JSON.
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,
    },
    /// Measure the cost of one scope on a private tree.
    Overhead {
        /// Enter/drop pairs to time.
        #[arg(long, default_value_t = 1_000_000)]
        iterations: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SCOPEMETER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Run {
            threads,
            count,
            reports,
            indent,
            precision,
            csv,
            csv_by_duration,
            json,
        } => cmd_run(RunArgs {
            threads,
            count,
            reports,
            options: RenderOptions {
                indent_width: indent,
                precision,
            },
            csv,
            csv_by_duration,
            json,
        }),
        Commands::Overhead { iterations } => cmd_overhead(iterations),
    }
}

struct RunArgs {
    threads: usize,
    count: u64,
    reports: Vec<ReportKind>,
    options: RenderOptions,
    csv: Option<PathBuf>,
    csv_by_duration: Option<PathBuf>,
    json: Option<PathBuf>,
}

fn cmd_run(args: RunArgs) -> Result<(), Error> {
    workload::run(args.threads, args.count)?;

    let reports = if args.reports.is_empty() {
        vec![
            ReportKind::ByDuration,
            ReportKind::Tree,
            ReportKind::Percentages,
        ]
    } else {
        args.reports
    };

    let global = global_tree();
    let tree = global.tree();
    anstream::print!("{}", render_all(&reports, &tree, &args.options));

    if let Some(path) = &args.csv {
        write_csv(path, CsvLayout::Totals, &tree, &args.options)?;
        info!(path = %path.display(), "wrote totals csv");
    }
    if let Some(path) = &args.csv_by_duration {
        write_csv(path, CsvLayout::ByDuration, &tree, &args.options)?;
        info!(path = %path.display(), "wrote sorted totals csv");
    }
    if let Some(path) = &args.json {
        write_json(path, &tree)?;
        info!(path = %path.display(), "wrote json tree");
    }
    Ok(())
}

fn cmd_overhead(iterations: u64) -> Result<(), Error> {
    let overhead = workload::measure_overhead(iterations)?;
    anstream::println!(
        "{} scopes: {} ns per scope, {} ns chore per scope",
        overhead.iterations,
        overhead.per_scope.as_nanos(),
        overhead.chore_per_scope.as_nanos()
    );
    Ok(())
}
