//! Diagflow CLI - run and validate diagnostic workflows

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use diagflow::error::{FixSuggestion, WorkflowError};
use diagflow::execution::WorkflowNodeExecution;
use diagflow::handlers::{MockDetectorClient, MockQueryClient, StepExecutor};
use diagflow::interpreter::Interpreter;
use diagflow::limits::RunLimits;
use diagflow::status::{NodeState, NodeStatus};
use diagflow::workflow::Workflow;

#[derive(Parser)]
#[command(name = "diagflow")]
#[command(about = "Diagflow - diagnostic workflow execution engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to workflow JSON file
        file: String,

        /// Maximum nodes executing concurrently
        #[arg(long, default_value_t = 8)]
        max_parallel: usize,

        /// Per-node handler timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Print the full execution tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow file (compile only)
    Validate {
        /// Path to workflow JSON file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            max_parallel,
            timeout,
            json,
        } => run_workflow(&file, max_parallel, timeout, json).await,
        Commands::Validate { file } => validate_workflow(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run_workflow(
    file: &str,
    max_parallel: usize,
    timeout: u64,
    json: bool,
) -> Result<(), WorkflowError> {
    let text = tokio::fs::read_to_string(file).await?;
    let workflow: Workflow = serde_json::from_str(&text)?;
    let compiled = diagflow::compile(workflow).map_err(WorkflowError::Compilation)?;

    let limits = RunLimits {
        max_parallelism: max_parallel,
        node_timeout: Duration::from_secs(timeout),
        ..RunLimits::default()
    };
    // The CLI has no real diagnostic backends wired in; mock clients echo
    // success so authored workflows can be exercised end to end.
    let executor = Arc::new(StepExecutor::new(
        Arc::new(MockDetectorClient::new()),
        Arc::new(MockQueryClient::new()),
    ));
    let interpreter = Interpreter::new(executor).with_limits(limits);

    let execution = interpreter.run(&compiled).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_tree(&execution.root, 0);
        println!();
        println!("Run status: {}", paint_status(execution.status));
    }
    Ok(())
}

fn validate_workflow(file: &str) -> Result<(), WorkflowError> {
    let text = fs::read_to_string(file)?;
    let workflow: Workflow = serde_json::from_str(&text)?;
    let compiled = diagflow::compile(workflow).map_err(WorkflowError::Compilation)?;

    println!("{} Workflow '{}' is valid", "✓".green(), file);
    println!("  Nodes: {}", compiled.metadata.node_count);
    println!("  Depth: {}", compiled.metadata.max_depth);
    println!("  Variables: {}", compiled.metadata.declared_variables);
    Ok(())
}

fn print_tree(node: &WorkflowNodeExecution, depth: usize) {
    let indent = "  ".repeat(depth);
    let state = match node.data.state {
        NodeState::Succeeded => "✓".green(),
        NodeState::Failed => "✗".red(),
        NodeState::Skipped => "-".dimmed(),
        NodeState::Pending => "…".yellow(),
        NodeState::Running => "→".cyan(),
    };
    println!(
        "{}{} {} [{}]",
        indent,
        state,
        node.id,
        paint_status(node.data.status)
    );
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn paint_status(status: NodeStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        NodeStatus::Critical => text.red().bold(),
        NodeStatus::Warning => text.yellow(),
        NodeStatus::Info => text.cyan(),
        NodeStatus::Success => text.green(),
        NodeStatus::None => text.dimmed(),
    }
}
