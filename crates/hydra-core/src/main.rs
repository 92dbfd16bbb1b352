//! hydra CLI entry point.
//!
//! stdout carries the command payload in the selected `--format`; logs go to
//! stderr. Exit codes are the stable contract in [`ExitCode`].

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use hydra_config::{load_config, resolve_data_dir, ConfigOptions, Platform, ResolvedConfig};
use hydra_core::collect::CollectSummary;
use hydra_core::exit_codes::ExitCode;
use hydra_core::log_event;
use hydra_core::logging::{
    event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use hydra_core::output::OutputFormat;
use hydra_core::remote::NodeExecutor;
use hydra_core::report::{render_json, render_summary};
use hydra_core::store::{ArtifactInfo, ArtifactKind, PruneReport, SnapshotStore};
use hydra_core::workflow::{
    list_artifacts, run_collect, run_drift, run_prune, CollectOptions, WorkflowError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hydra")]
#[command(author, version, about = "Cluster state snapshots and drift detection", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides HYDRA_CONFIG and the search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding snapshots and reports
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "md")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect a snapshot bundle from every configured node
    Collect(CollectArgs),

    /// Compare the two most recent bundles and write a drift report
    Drift,

    /// List stored artifacts, newest first
    List(ListArgs),

    /// Load and validate the configuration
    Check,

    /// Apply the retention policy to stored artifacts
    Prune(PruneArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// Only collect these node labels (repeatable)
    #[arg(long = "node", value_name = "LABEL")]
    nodes: Vec<String>,

    /// Skip retention after writing the bundle
    #[arg(long)]
    no_prune: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Maximum number of entries
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// List drift reports instead of bundles
    #[arg(long)]
    reports: bool,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Show what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct CompletionsArgs {
    /// Target shell
    shell: Shell,
}

fn main() {
    let cli = Cli::parse();

    let cli_format = cli
        .global
        .format
        .prefers_json_logs()
        .then_some(LogFormat::Jsonl);
    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli_format,
    );
    init_logging(&log_config);

    let ctx = LogContext::for_run();
    let exit_code = match &cli.command {
        Commands::Collect(args) => run_collect_cmd(&cli.global, args, &ctx),
        Commands::Drift => run_drift_cmd(&cli.global, &ctx),
        Commands::List(args) => run_list_cmd(&cli.global, args, &ctx),
        Commands::Check => run_check_cmd(&cli.global, &ctx),
        Commands::Prune(args) => run_prune_cmd(&cli.global, args, &ctx),
        Commands::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "hydra",
                &mut std::io::stdout(),
            );
            ExitCode::Clean
        }
    };

    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Report,
        "run finished",
        exit_code = exit_code.as_i32(),
        code_name = exit_code.code_name()
    );
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Setup
// ============================================================================

fn open(
    global: &GlobalOpts,
    ctx: &LogContext,
) -> Result<(ResolvedConfig, SnapshotStore), WorkflowError> {
    let options = ConfigOptions {
        config_path: global.config.clone(),
    };
    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::CONFIG_ERROR,
                Stage::Init,
                "configuration rejected",
                error = e.to_string().as_str()
            );
            return Err(e.into());
        }
    };

    let snapshot = config.snapshot();
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration loaded",
        source = snapshot.source.to_string().as_str(),
        sha256 = snapshot.short_hash(),
        nodes = snapshot.node_count
    );

    let data_dir = resolve_data_dir(global.data_dir.as_deref(), &config.config);
    let store = SnapshotStore::new(
        data_dir,
        Duration::from_secs(config.config.store.lock_lease_secs),
        ctx.clone(),
    );
    Ok((config, store))
}

// ============================================================================
// Commands
// ============================================================================

fn run_collect_cmd(global: &GlobalOpts, args: &CollectArgs, ctx: &LogContext) -> ExitCode {
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "starting collection"
    );
    let (config, store) = match open(global, ctx) {
        Ok(opened) => opened,
        Err(e) => return output_error(global, &e),
    };

    let executor = NodeExecutor::new(&config.config.ssh, &config.config.collection);
    let options = CollectOptions {
        nodes: args.nodes.clone(),
        prune: !args.no_prune,
    };
    match run_collect(&config, &store, &executor, &options, ctx) {
        Ok(summary) => {
            print_collect(global.format, &summary);
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

fn run_drift_cmd(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "starting drift comparison"
    );
    let (_, store) = match open(global, ctx) {
        Ok(opened) => opened,
        Err(e) => return output_error(global, &e),
    };

    match run_drift(&store, ctx) {
        Ok(run) => {
            match global.format {
                OutputFormat::Md => print!("{}", run.markdown),
                OutputFormat::Json => print_json(&run.outcome),
                OutputFormat::Summary => println!("{}", render_summary(&run.outcome)),
            }
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

fn run_list_cmd(global: &GlobalOpts, args: &ListArgs, ctx: &LogContext) -> ExitCode {
    let (_, store) = match open(global, ctx) {
        Ok(opened) => opened,
        Err(e) => return output_error(global, &e),
    };
    let kind = if args.reports {
        ArtifactKind::Report
    } else {
        ArtifactKind::Bundle
    };

    match list_artifacts(&store, kind, Some(args.limit)) {
        Ok(artifacts) => {
            print_list(global.format, &store, &artifacts);
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

#[derive(Serialize)]
struct PlatformCoverage {
    platform: Platform,
    supported: usize,
    unsupported: Vec<String>,
}

fn run_check_cmd(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    let (config, store) = match open(global, ctx) {
        Ok(opened) => opened,
        Err(e) => return output_error(global, &e),
    };
    let snapshot = config.snapshot();
    let coverage: Vec<PlatformCoverage> = Platform::ALL
        .iter()
        .map(|p| PlatformCoverage {
            platform: *p,
            supported: config.commands.supported_count(*p),
            unsupported: config
                .commands
                .unsupported_sections(*p)
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
        .collect();

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "ok",
            "config": snapshot,
            "data_dir": store.root(),
            "nodes": config.config.nodes,
            "coverage": coverage,
        })),
        OutputFormat::Summary => println!(
            "config ok: {} node(s) from {} ({})",
            snapshot.node_count,
            snapshot.source,
            snapshot.short_hash()
        ),
        OutputFormat::Md => {
            println!("# Configuration Check");
            println!();
            println!("**Status: OK**");
            println!();
            match &snapshot.path {
                Some(path) => println!("- Source: {} (`{}`)", snapshot.source, path.display()),
                None => println!("- Source: {}", snapshot.source),
            }
            println!("- SHA-256: {}", snapshot.short_hash());
            println!("- Data directory: `{}`", store.root().display());
            println!();
            println!("## Nodes");
            println!();
            for node in &config.config.nodes {
                println!(
                    "- `{}` {} ({}, {:?})",
                    node.label,
                    node.target(),
                    node.platform,
                    node.transport
                );
            }
            println!();
            println!("## Section Coverage");
            println!();
            for c in &coverage {
                let skipped = if c.unsupported.is_empty() {
                    "none".to_string()
                } else {
                    c.unsupported.join(", ")
                };
                println!(
                    "- {}: {} supported, unsupported: {}",
                    c.platform, c.supported, skipped
                );
            }
        }
    }
    ExitCode::Clean
}

fn run_prune_cmd(global: &GlobalOpts, args: &PruneArgs, ctx: &LogContext) -> ExitCode {
    let (config, store) = match open(global, ctx) {
        Ok(opened) => opened,
        Err(e) => return output_error(global, &e),
    };
    match run_prune(&store, &config.config.store.retention, args.dry_run) {
        Ok(report) => {
            print_prune(global.format, &report);
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to encode JSON output: {}", e),
    }
}

fn print_collect(format: OutputFormat, summary: &CollectSummary) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Summary => println!("{}", summary.one_line()),
        OutputFormat::Md => {
            println!("# Collection Summary");
            println!();
            println!("| Metric | Count |");
            println!("|---|---|");
            println!("| Nodes | {} |", summary.nodes_total);
            println!("| Reachable | {} |", summary.nodes_reachable);
            println!("| Unreachable | {} |", summary.nodes_unreachable);
            println!("| Sections ok | {} |", summary.sections_ok);
            println!("| Sections failed | {} |", summary.sections_failed);
            println!("| Sections skipped | {} |", summary.sections_skipped);
            println!("| Artifacts pruned | {} |", summary.pruned);
            if let Some(id) = &summary.artifact_id {
                println!();
                println!("Bundle: `{}`", id);
            }
        }
    }
}

fn print_list(format: OutputFormat, store: &SnapshotStore, artifacts: &[ArtifactInfo]) {
    match format {
        OutputFormat::Json => print_json(&artifacts),
        OutputFormat::Summary => println!(
            "{} artifact(s){}",
            artifacts.len(),
            artifacts
                .first()
                .map(|a| format!(", newest {}", a.id))
                .unwrap_or_default()
        ),
        OutputFormat::Md => {
            let latest = store.latest().ok().flatten().map(|p| p.id);
            if artifacts.is_empty() {
                println!("No artifacts stored in `{}`.", store.root().display());
            }
            for a in artifacts {
                let marker = if latest.as_deref() == Some(a.id.as_str()) {
                    " (latest)"
                } else {
                    ""
                };
                println!("- `{}` {}{}", a.id, a.timestamp.to_rfc3339(), marker);
            }
        }
    }
}

fn print_prune(format: OutputFormat, report: &PruneReport) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Summary => println!(
            "{}{} artifact(s); kept {} bundle(s), {} report(s)",
            if report.dry_run { "would prune " } else { "pruned " },
            if report.dry_run {
                report.candidate_count()
            } else {
                report.deleted_count()
            },
            report.kept_bundles,
            report.kept_reports
        ),
        OutputFormat::Md => {
            println!(
                "# Retention{}",
                if report.dry_run { " (dry run)" } else { "" }
            );
            println!();
            if report.events.is_empty() {
                println!("Nothing to prune.");
            }
            for event in &report.events {
                let state = match (event.dry_run, event.deleted) {
                    (true, _) => "would delete",
                    (false, true) => "deleted",
                    (false, false) => "delete failed",
                };
                println!("- `{}` {}: {}", event.id, state, event.reason);
            }
            println!();
            println!(
                "Kept {} bundle(s) and {} report(s).",
                report.kept_bundles, report.kept_reports
            );
        }
    }
}

/// Report a failed command on stderr and return its exit code.
fn output_error(global: &GlobalOpts, error: &WorkflowError) -> ExitCode {
    let exit_code = error.exit_code();
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "status": "error",
                "error": {
                    "code": exit_code.as_i32(),
                    "kind": exit_code.code_name(),
                    "message": error.to_string(),
                }
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_else(|_| error.to_string())
            );
        }
        OutputFormat::Summary => eprintln!("[{}] {}", exit_code.code_name(), error),
        OutputFormat::Md => {
            eprintln!("# Error");
            eprintln!();
            eprintln!("{}: {}", exit_code, error);
        }
    }
    exit_code
}
