//! # flowgraph-cli
//!
//! Headless runner for persisted flowgraph documents.
//!
//! Exit codes: `0` success, `1` validation or load error, `2` node error,
//! `3` cancelled, `4` timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flowgraph_core::{
    apply_variable_overrides, nodes, ErrorKind, ExecutionService, GraphDocument, HeadlessRunner,
    NodeRegistry, RunParams, RunResult, Severity, SocketTypeRegistry, ValidationReport,
};

const EXIT_OK: i32 = 0;
const EXIT_VALIDATION: i32 = 1;
const EXIT_NODE_ERROR: i32 = 2;
const EXIT_CANCELLED: i32 = 3;
const EXIT_TIMEOUT: i32 = 4;

#[derive(Parser)]
#[command(name = "flowgraph")]
#[command(about = "Run and validate flowgraph graph documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph document
    Run {
        /// Path to the graph JSON document
        #[arg(long)]
        graph: PathBuf,

        /// Override a graph variable default, as NAME=VALUE
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Maximum concurrently running initiators
        #[arg(long, env = "ENGINE_MAX_PARALLELISM")]
        parallel: Option<usize>,

        /// Abort the run after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,
    },

    /// Validate a graph document without executing it
    Validate {
        /// Path to the graph JSON document
        #[arg(long)]
        graph: PathBuf,
    },
}

fn build_runner() -> anyhow::Result<HeadlessRunner> {
    let mut registry = NodeRegistry::new();
    registry
        .register_module(&nodes::standard_module())
        .map_err(|e| anyhow::anyhow!("failed to register standard nodes: {e}"))?;
    let service = Arc::new(ExecutionService::new(
        Arc::new(registry),
        Arc::new(SocketTypeRegistry::with_standard_conversions()),
    ));
    Ok(HeadlessRunner::new(service))
}

fn parse_overrides(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("--set expects KEY=VALUE, got '{entry}'"))
        })
        .collect()
}

fn print_report(report: &ValidationReport) {
    for message in &report.messages {
        let prefix = match message.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match &message.node_id {
            Some(node) => eprintln!("{prefix}: {} (node {node})", message.message),
            None => eprintln!("{prefix}: {}", message.message),
        }
    }
}

fn exit_code_for(result: &RunResult) -> i32 {
    match &result.error {
        None => EXIT_OK,
        Some(failure) if failure.kind == ErrorKind::Cancelled => EXIT_CANCELLED,
        Some(_) => EXIT_NODE_ERROR,
    }
}

async fn run_command(
    graph_path: &PathBuf,
    overrides: &[(String, String)],
    parallel: Option<usize>,
    timeout: Option<u64>,
) -> i32 {
    let runner = match build_runner() {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_VALIDATION;
        }
    };

    let document = match GraphDocument::from_file(graph_path) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("error: cannot load {}: {err}", graph_path.display());
            return EXIT_VALIDATION;
        }
    };

    let outcome = document.resolve(runner.service().registry());
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    let mut graph = outcome.graph;
    apply_variable_overrides(&mut graph, overrides);

    let mut params = RunParams::default();
    params.options = flowgraph_core::ExecutionOptions::from_env();
    if let Some(parallel) = parallel {
        params.options.max_parallelism = parallel.max(1);
    }
    let cancel = params.cancel.clone();

    ctrlc_cancel(cancel.clone());

    let run = runner.run_graph(&graph, params);
    tokio::pin!(run);

    let outcome = if let Some(ms) = timeout {
        tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                eprintln!("error: run exceeded {ms}ms; cancelling");
                cancel.cancel();
                // Let the run unwind before reporting the timeout.
                let _ = run.await;
                return EXIT_TIMEOUT;
            }
        }
    } else {
        run.await
    };

    match outcome {
        flowgraph_core::RunOutcome::Rejected(report) => {
            print_report(&report);
            EXIT_VALIDATION
        }
        flowgraph_core::RunOutcome::Finished(result) => {
            for message in &result.messages {
                println!("[{:?}] {}", message.severity, message.text);
            }
            if let Some(failure) = &result.error {
                eprintln!("error: {}", failure.message);
            }
            exit_code_for(&result)
        }
    }
}

fn ctrlc_cancel(cancel: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; cancelling run");
            cancel.cancel();
        }
    });
}

fn validate_command(graph_path: &PathBuf) -> i32 {
    let runner = match build_runner() {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_VALIDATION;
        }
    };

    let document = match GraphDocument::from_file(graph_path) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("error: cannot load {}: {err}", graph_path.display());
            return EXIT_VALIDATION;
        }
    };

    let report = runner.validate(&document);
    print_report(&report);
    if report.has_errors() {
        EXIT_VALIDATION
    } else {
        println!("graph is valid");
        EXIT_OK
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            graph,
            set,
            parallel,
            timeout,
        } => match parse_overrides(&set) {
            Ok(overrides) => run_command(&graph, &overrides, parallel, timeout).await,
            Err(err) => {
                eprintln!("error: {err}");
                EXIT_VALIDATION
            }
        },
        Commands::Validate { graph } => validate_command(&graph),
    };
    std::process::exit(code);
}
