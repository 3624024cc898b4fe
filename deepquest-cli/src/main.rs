//! Deepquest CLI - run a deep research pass from the command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use deepquest_core::{
    init_logging, DeepquestConfig, KnowledgeStore, ProgressSink, ProgressStage,
};
use deepquest_engine::ResearchSolver;
use deepquest_llm::{CompletionClient, SiumaiClient};
use deepquest_report::{render_html, render_markdown, OutputOrganizer};
use deepquest_tools::{KnowledgeSearchTool, RetrievalTool, Toolset, WebSearchTool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "deepquest")]
#[command(about = "Recursive research agent that decomposes a question and writes a structured report")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and write the report
    Research {
        /// The research question
        question: String,

        /// Output file for the report
        #[arg(short, long, default_value = "report.md")]
        output: PathBuf,

        /// Export format (markdown, html, json)
        #[arg(short, long, default_value = "markdown")]
        format: String,

        /// Override maximum recursion depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Override the run timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// SearxNG-compatible search endpoint for web retrieval
        #[arg(long)]
        search_endpoint: Option<String>,
    },

    /// Write a default configuration file
    ConfigInit {
        /// Destination path (defaults to the per-user config location)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Research {
            question,
            output,
            format,
            max_depth,
            timeout,
            search_endpoint,
        } => {
            if let Some(depth) = max_depth {
                config.run.max_depth = depth;
            }
            if let Some(secs) = timeout {
                config.run.timeout_secs = secs;
            }
            if search_endpoint.is_some() {
                config.retrieval.search_endpoint = search_endpoint;
            }
            config.validate()?;

            run_research(&config, &question, &output, &format).await
        }
        Commands::ConfigInit { path } => {
            let path = path.unwrap_or_else(DeepquestConfig::default_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            DeepquestConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<DeepquestConfig> {
    match path {
        Some(path) => Ok(DeepquestConfig::from_file(path)?),
        None => {
            let default_path = DeepquestConfig::default_path();
            if default_path.exists() {
                Ok(DeepquestConfig::from_file(default_path)?)
            } else {
                Ok(DeepquestConfig::default())
            }
        }
    }
}

async fn run_research(
    config: &DeepquestConfig,
    question: &str,
    output: &PathBuf,
    format: &str,
) -> anyhow::Result<()> {
    let client: Arc<dyn CompletionClient> =
        Arc::new(SiumaiClient::new(config.models.clone()).await?);

    let knowledge = Arc::new(KnowledgeStore::new());
    let toolset = Arc::new(build_toolset(config, Arc::clone(&knowledge))?);

    let (progress, mut progress_rx) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            eprintln!("[{:>3.0}%] {}", event.progress_percent * 100.0, event.message);
        }
    });

    let solver = ResearchSolver::new(
        Arc::clone(&client),
        toolset,
        Arc::clone(&knowledge),
        config,
        progress.clone(),
    );
    let outcome = solver.solve(question).await?;
    drop(solver);

    let organizer = OutputOrganizer::new(client, progress.clone());
    let report = organizer.organize(question, &outcome, &knowledge).await;
    drop(organizer);

    progress.emit(ProgressStage::Completed, 1.0, "Report generated");
    drop(progress);
    let _ = printer.await;

    let rendered = match format {
        "markdown" => render_markdown(&report),
        "html" => render_html(&report),
        "json" => serde_json::to_string_pretty(&report)?,
        other => anyhow::bail!("unsupported export format: {}", other),
    };
    tokio::fs::write(output, rendered)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    info!(
        sections = report.section_count(),
        entries = knowledge.len().await,
        "Report written to {}",
        output.display()
    );
    println!("Report written to {}", output.display());

    if let Some(reason) = &report.failure {
        warn!(reason = %reason, "Research run failed; report contains partial findings");
        anyhow::bail!("research failed: {}", reason);
    }
    Ok(())
}

fn build_toolset(
    config: &DeepquestConfig,
    knowledge: Arc<KnowledgeStore>,
) -> anyhow::Result<Toolset> {
    if !config.retrieval.enabled {
        return Ok(Toolset::empty());
    }

    let mut tools: Vec<Arc<dyn RetrievalTool>> = vec![Arc::new(KnowledgeSearchTool::new(
        knowledge,
        config.retrieval.max_results,
    ))];

    if let Some(endpoint) = &config.retrieval.search_endpoint {
        tools.push(Arc::new(WebSearchTool::new(endpoint, &config.retrieval)?));
    } else {
        info!("No search endpoint configured, web retrieval disabled");
    }

    Ok(Toolset::new(tools, config.retrieval.max_results))
}
