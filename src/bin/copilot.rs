//! Copilot command line interface
//!
//! Interactive analytics sessions against the configured BigQuery dataset,
//! plus a connectivity check that lists tables and renders their bounded
//! schema summaries.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use bq_copilot::{
    AnalystAgent, BigQueryWarehouse, CopilotConfig, GeminiClient, QueryExecutor, SchemaInspector,
    ToolDispatcher, Warehouse,
};

#[derive(Parser)]
#[command(name = "copilot")]
#[command(version = "0.1.0")]
#[command(about = "BigQuery analytics copilot - ask questions, get guarded answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path
    #[arg(long, global = true, default_value = "settings/copilot.yaml")]
    config: PathBuf,

    /// GCP billing project id (overrides settings file)
    #[arg(long, global = true)]
    project: Option<String>,

    /// Dataset id in `project.dataset` form (overrides settings file)
    #[arg(long, global = true)]
    dataset: Option<String>,

    /// Verbose logs (INFO) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Debug logs (most detailed)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive analysis session
    Chat {
        /// Gemini model name (overrides settings file)
        #[arg(long)]
        model: Option<String>,
    },

    /// Verify BigQuery connectivity and inspect table schemas
    Check {
        /// Comma-separated table names to describe
        #[arg(long)]
        tables: Option<String>,
    },
}

fn init_logging(verbose: bool, debug: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn boxed(title: &str) -> String {
    let pad = format!("  {}  ", title.trim());
    format!(
        "┌{border}┐\n│{pad}│\n└{border}┘",
        border = "─".repeat(pad.chars().count()),
        pad = pad
    )
}

fn rule(label: &str) -> String {
    let tag = if label.is_empty() {
        String::new()
    } else {
        format!(" {} ", label)
    };
    format!("{}{}", tag, "─".repeat(72usize.saturating_sub(tag.len())))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Best-effort .env load before anything reads the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    let config = match CopilotConfig::load(&cli.config) {
        Ok(cfg) => cfg.with_overrides(
            cli.project.clone(),
            cli.dataset.clone(),
            match &cli.command {
                Commands::Chat { model } => model.clone(),
                _ => None,
            },
        ),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Chat { .. } => cmd_chat(&config).await,
        Commands::Check { tables } => cmd_check(&config, tables.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn build_warehouse(config: &CopilotConfig) -> anyhow::Result<Arc<dyn Warehouse>> {
    let dataset = config.dataset_id()?;
    let warehouse =
        BigQueryWarehouse::from_env(config.warehouse.project_id.as_deref(), dataset)?;
    Ok(Arc::new(warehouse))
}

async fn cmd_chat(config: &CopilotConfig) -> anyhow::Result<()> {
    let dataset = config.dataset_id()?.to_string();
    let warehouse = build_warehouse(config)?;
    let llm = Arc::new(GeminiClient::from_env(&config.agent)?);
    let dispatcher = ToolDispatcher::new(
        QueryExecutor::new(warehouse.clone(), config.safety),
        SchemaInspector::new(warehouse),
    );
    let agent = AnalystAgent::new(llm, dispatcher, &config.agent, &dataset);

    println!("{}", boxed("BigQuery Copilot").cyan());
    println!(
        "Dataset: {} - type ':quit' to exit.\n",
        dataset.as_str().bold()
    );

    let stdin = io::stdin();
    loop {
        println!("{}", rule("ask").dimmed());
        print!(" › ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), ":quit" | "quit" | "exit") {
            break;
        }

        println!("{}", rule("response").dimmed());
        match agent.run_turn(question).await {
            Ok(report) => {
                println!("{}", report.answer);
                if report.forced {
                    println!(
                        "{}",
                        format!("(stopped after {} tool calls)", report.tool_calls).dimmed()
                    );
                }
            }
            Err(e) => {
                println!("{} {e}", "Something went wrong:".red());
            }
        }
        println!("{}\n", rule("").dimmed());
    }

    Ok(())
}

async fn cmd_check(config: &CopilotConfig, tables_csv: Option<&str>) -> anyhow::Result<()> {
    let warehouse = build_warehouse(config)?;
    let inspector = SchemaInspector::new(warehouse.clone());

    println!("{}", boxed("Dataset Tables").cyan());
    let tables = warehouse.list_tables().await?;
    for t in &tables {
        println!("• {t}");
    }

    let targets: Vec<&str> = tables_csv
        .unwrap_or("orders,order_items,products,users")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    for table in targets {
        println!();
        match inspector.inspect(table).await {
            Ok(summary) => println!("{}", summary.render()),
            Err(e) => println!("{} {table}: {e}", "skipped".yellow()),
        }
    }

    Ok(())
}
