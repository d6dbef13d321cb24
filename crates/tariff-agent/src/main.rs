use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tariff_agent::telemetry::{self, LogFormat};
use tariff_agent::{build_orchestrator, AgentConfig, BatchClassifier, LlmOracle};
use tariff_cascade::{CascadeError, Classification, ClassifyRequest, SearchConfig, Tier};
use tracing::info;

/// Exit code for a search that completed without a match.
const EXIT_NO_MATCH: u8 = 1;
/// Exit code for hard failures (oracle, data access, configuration).
const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "tariff-agent", version, about = "Cascading tariff classification")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one search term
    Classify {
        term: String,
        /// sections, chapters, positions4 or positions6
        #[arg(long, default_value = "positions6")]
        depth: Tier,
        /// Return only the deepest tier's nodes
        #[arg(long)]
        no_cascade: bool,
        /// Return codes without descriptions
        #[arg(long)]
        no_description: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify every row of a TSV/CSV file with `article` and `code` columns
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        pause_secs: Option<u64>,
        #[arg(long, default_value = "positions6")]
        depth: Tier,
    },
    /// Probe the oracle endpoint
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = telemetry::init(format) {
        eprintln!("{e:#}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AgentConfig::load(cli.config.as_deref())?;
    info!(
        oracle = %config.oracle.base_url,
        model = %config.oracle.model,
        "tariff agent starting"
    );

    match cli.command {
        Command::Classify {
            term,
            depth,
            no_cascade,
            no_description,
            json,
        } => {
            let search = SearchConfig {
                with_cascade: config.cascade.search.with_cascade && !no_cascade,
                with_description: config.cascade.search.with_description && !no_description,
            };
            classify(&config, ClassifyRequest::new(term, depth).with_search(search), json).await
        }
        Command::Batch {
            input,
            output,
            batch_size,
            pause_secs,
            depth,
        } => {
            let orchestrator = build_orchestrator(&config).await?;
            let batch_size = batch_size.unwrap_or(config.batch.batch_size);
            let pause = pause_secs.map_or(config.batch.pause(), Duration::from_secs);
            let classifier = BatchClassifier::new(orchestrator, batch_size, pause)?.with_depth(depth);
            let summary = classifier
                .run_file(&input, &output)
                .await
                .with_context(|| format!("Batch run on {} failed", input.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let oracle = LlmOracle::new(config.oracle.clone())?;
            let models = oracle
                .probe()
                .await
                .with_context(|| format!("Oracle at {} is not reachable", config.oracle.base_url))?;
            println!("{} reachable, {} model(s) served", config.oracle.base_url, models.len());
            for model in &models {
                println!("  {model}");
            }
            if !models.is_empty() && !models.contains(&config.oracle.model) {
                return Err(anyhow!(
                    "configured model {} is not served by {}",
                    config.oracle.model,
                    config.oracle.base_url
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn classify(config: &AgentConfig, request: ClassifyRequest, json: bool) -> Result<ExitCode> {
    let orchestrator = build_orchestrator(config).await?;
    match orchestrator.classify_request(&request).await {
        Ok(result) => {
            print_classification(&result, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(&e, json),
    }
}

fn print_classification(result: &Classification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    for node in &result.nodes {
        match &node.description {
            Some(description) => println!("{}\t{}", node.code, description),
            None => println!("{}", node.code),
        }
    }
    Ok(())
}

fn report_failure(error: &CascadeError, json: bool) -> Result<ExitCode> {
    let kind = error.kind();
    if json {
        let body = serde_json::json!({
            "error": kind.to_string(),
            "status": kind.status_code(),
            "tier": error.tier(),
            "message": error.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        eprintln!("{error}");
    }
    Ok(ExitCode::from(if kind.is_hard_failure() {
        EXIT_FAILURE
    } else {
        EXIT_NO_MATCH
    }))
}
