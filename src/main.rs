//! # Research Graph CLI
//!
//! Command-line front end for the research workflow. It loads configuration,
//! wires the Ollama model and the two search adapters into an
//! [`Orchestrator`], prints one progress line per completed step and finally
//! the report.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "battery recycling"
//! cargo run -- --json "solid-state electrolytes" > run.jsonl
//! cargo run -- --graph
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use research_graph::graph;
use research_graph::{
    ArxivSearchTool, Config, LlmError, OllamaModel, Orchestrator, ResearchError, ResearchUpdate,
    RunError, RunEvent, StepObservation, WebSearchTool,
};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "research-graph",
    version,
    about = "An autonomous research assistant that searches the web and arXiv and writes a report",
    long_about = r#"
Research Graph - plan, search, analyze, refine, write.

For a topic, the assistant will:
  1. Split the topic into subtopics
  2. Choose web search or arXiv paper search for each subtopic
  3. Judge whether the results are sufficient, refining the query if not
  4. Write a report from all accepted evidence

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

EXAMPLES:
  research-graph "battery recycling"
  research-graph --model qwen2.5 --max-retries 2 "perovskite solar cells"
  research-graph --json "grid-scale storage" | jq .step
"#
)]
struct Args {
    /// The research topic
    #[arg(value_name = "TOPIC", required_unless_present = "graph")]
    topic: Option<String>,

    /// Ollama model to use (overrides OLLAMA_MODEL)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Search attempts per subtopic before evidence is accepted anyway
    #[arg(long = "max-retries")]
    max_retries: Option<u32>,

    /// Ceiling on total step executions
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// Print every observation as one JSON line
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Print the workflow graph as Mermaid and exit
    #[arg(long = "graph", default_value = "false")]
    graph: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.graph {
        print!("{}", graph::to_mermaid());
        return Ok(());
    }

    let mut config = Config::from_env().context("Failed to load configuration")?;
    init_logging(args.verbose, &config.log_level)?;

    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.model = model;
    }
    if let Some(max_retries) = args.max_retries {
        config.workflow.max_retries = max_retries;
    }
    if let Some(max_steps) = args.max_steps {
        config.workflow.max_steps = max_steps;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        model = %config.model,
        host = %config.ollama_host,
        max_retries = config.workflow.max_retries,
        max_steps = config.workflow.max_steps,
        "Configuration loaded"
    );

    let model = OllamaModel::from_config(&config).context("Failed to create Ollama client")?;
    let web = WebSearchTool::new(config.max_search_results)
        .context("Failed to create web search client")?;
    let papers = ArxivSearchTool::new(config.max_search_results)
        .context("Failed to create arXiv client")?;
    let orchestrator = Orchestrator::builder()
        .model(Arc::new(model))
        .web_search(Arc::new(web))
        .paper_search(Arc::new(papers))
        .config(config.workflow.clone())
        .build()?;

    // `required_unless_present` guarantees a topic here
    let topic = args.topic.unwrap_or_default();
    let mut run = orchestrator.run(topic);

    let cancel = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling research run");
            cancel.cancel();
        }
    });

    while let Some(event) = run.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                report_failure(&e);
                return Err(e.into());
            }
        };

        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            if matches!(event, RunEvent::Completed { .. }) {
                return Ok(());
            }
            continue;
        }

        match event {
            RunEvent::Step(observation) => print_observation(&observation),
            RunEvent::Completed { report, state } => {
                println!("\n{}", "=".repeat(60));
                println!("RESEARCH REPORT: {}", state.topic());
                println!("{}\n", "=".repeat(60));
                println!("{}", report);
                println!("\n{}", "=".repeat(60));
                info!("Research completed successfully");
                return Ok(());
            }
        }
    }

    anyhow::bail!("Research on {:?} cancelled before the report was written", run.topic())
}

// =============================================================================
// OUTPUT
// =============================================================================
fn print_observation(observation: &StepObservation) {
    println!("[{:>2}] {}", observation.index, observation.step.description());
    for line in describe_update(&observation.update) {
        println!("     - {}", line);
    }
    if let Some(fallback) = &observation.fallback {
        println!(
            "     ! {} output {:?} not understood, used {}",
            fallback.context, fallback.raw, fallback.applied
        );
    }
}

/// Short human-readable lines for the fields an update sets.
fn describe_update(update: &ResearchUpdate) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(subtopics) = &update.subtopics {
        lines.push(format!("subtopics: {}", subtopics.join(" | ")));
    }
    if update.advance_subtopic {
        lines.push("subtopic accepted".to_string());
    }
    if let Some(query) = &update.current_query {
        lines.push(format!("query: {}", query));
    }
    if let Some(tool) = update.tool_choice {
        lines.push(format!("tool: {}", tool));
    }
    if let Some(results) = &update.search_results {
        lines.push(format!("results: {} chars", results.chars().count()));
    }
    if let Some(decision) = update.decision {
        lines.push(format!("decision: {}", decision));
    }
    if let Some(retries) = update.retries {
        lines.push(format!("attempts: {}", retries));
    }
    if update.report.is_some() {
        lines.push("report written".to_string());
    }

    lines
}

/// Log the failure and print a hint for the common causes.
fn report_failure(e: &RunError) {
    error!(step = %e.step, error = %e, "Research failed");
    eprintln!("\nResearch failed: {}", e);

    if e.is_runaway() {
        eprintln!("\nTip: the workflow made no progress within the step limit.");
        eprintln!("   Try a larger --max-steps or a lower --max-retries.");
        return;
    }

    let mut cause = &e.source;
    while let ResearchError::RetriesExhausted { last, .. } = cause {
        cause = last;
    }
    match cause {
        ResearchError::Model(LlmError::Connection(_)) | ResearchError::Timeout { .. } => {
            eprintln!("\nTip: make sure Ollama is running:");
            eprintln!("   ollama serve");
        }
        ResearchError::Model(LlmError::Provider(message)) if message.contains("model") => {
            eprintln!("\nTip: make sure the model is installed:");
            eprintln!("   ollama pull llama3.2");
        }
        _ => {}
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global tracing subscriber.
///
/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
