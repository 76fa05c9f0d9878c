use anyhow::{Context, Result};
use capture_ledger::{CaptureEvent, CaptureLedger, CaptureTap, LedgerConfig};
use clap::{Args, Parser, Subcommand};
use header_vault::HeaderVault;
use prometheus::Encoder;
use query_relay::{
    HttpRemoteReasoner, InMemoryCatalog, QueryOrchestrator, QueryStatus, ToolDescriptor, ToolRunner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tapforge_cli::config::AppConfig;
use tapforge_cli::forge::derive_tool_drafts;

/// Tapforge - capture browser API traffic and relay it as tools
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded capture stream into the exchange ledger
    Replay(ReplayArgs),

    /// Ask the remote reasoner one question, executing tools locally
    Ask(AskArgs),

    /// Derive tool definitions from captured traffic
    Tools(ToolsArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Capture file (JSON lines, one capture event per line)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Print the capture counters as prometheus text after the replay
    #[arg(long)]
    stats: bool,

    /// Print the resulting exchanges as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AskArgs {
    /// The question to send to the remote reasoner
    #[arg(short, long)]
    question: String,

    /// JSON file with the tool definitions to offer (array of descriptors)
    #[arg(long, value_name = "FILE")]
    tools: Option<PathBuf>,

    /// Capture file used to seed the header vault before execution
    #[arg(long, value_name = "FILE")]
    capture: Option<PathBuf>,

    /// Print the full query record as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ToolsArgs {
    #[command(subcommand)]
    action: ToolsAction,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// Derive tool drafts from a recorded capture stream
    Derive(DeriveArgs),
}

#[derive(Args)]
struct DeriveArgs {
    /// Capture file (JSON lines, one capture event per line)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Write the drafts to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    info!(
        "Starting tapforge v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE")
    );

    let config = AppConfig::load(cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Replay(args) => cmd_replay(args).await,
        Commands::Ask(args) => cmd_ask(args, &config).await,
        Commands::Tools(args) => match args.action {
            ToolsAction::Derive(args) => cmd_tools_derive(args).await,
        },
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Offline replay never fetches bodies over the network.
fn offline_ledger_config() -> LedgerConfig {
    LedgerConfig {
        auto_fetch_bodies: false,
        ..LedgerConfig::default()
    }
}

/// Feed every JSONL line of `path` through the tap. Malformed lines are
/// skipped with a warning; returns (applied, malformed).
async fn apply_capture_file(path: &Path, tap: &CaptureTap) -> Result<(usize, usize)> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read capture file {}", path.display()))?;

    let mut applied = 0usize;
    let mut malformed = 0usize;
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CaptureEvent>(line) {
            Ok(event) => {
                tap.apply(event);
                applied += 1;
            }
            Err(err) => {
                malformed += 1;
                warn!("skipping malformed capture line {}: {}", number + 1, err);
            }
        }
    }
    Ok((applied, malformed))
}

async fn cmd_replay(args: ReplayArgs) -> Result<()> {
    let vault = Arc::new(HeaderVault::new());
    let ledger =
        Arc::new(CaptureLedger::new(offline_ledger_config()).with_vault(Arc::clone(&vault)));
    let tap = CaptureTap::new(Arc::clone(&ledger));

    let (applied, malformed) = apply_capture_file(&args.input, &tap).await?;
    let exchanges = ledger.list();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&exchanges)?);
    } else {
        println!(
            "Replayed {} event(s) ({} malformed) -> {} exchange(s), {} vault domain(s)",
            applied,
            malformed,
            exchanges.len(),
            vault.len()
        );
        for exchange in &exchanges {
            let status = exchange
                .final_status
                .or(exchange.status)
                .map(|status| status.to_string())
                .unwrap_or_else(|| "-".to_string());
            let state = if exchange.completed { "done" } else { "open" };
            println!(
                "  {:>4} {:<4} {:<7} {}",
                status, state, exchange.method, exchange.url
            );
        }
    }

    if args.stats {
        print_capture_stats()?;
    }

    Ok(())
}

async fn cmd_ask(args: AskArgs, config: &AppConfig) -> Result<()> {
    let vault = Arc::new(HeaderVault::new());
    if let Some(capture) = &args.capture {
        let ledger =
            Arc::new(CaptureLedger::new(offline_ledger_config()).with_vault(Arc::clone(&vault)));
        let tap = CaptureTap::new(Arc::clone(&ledger));
        apply_capture_file(capture, &tap).await?;
        info!(
            "seeded {} vault domain(s) from {}",
            vault.len(),
            capture.display()
        );
    }

    let tools = match &args.tools {
        Some(path) => load_tool_list(path).await?,
        None => Vec::new(),
    };
    if tools.is_empty() {
        warn!("no tools configured; the remote can only answer directly");
    }

    let catalog = Arc::new(InMemoryCatalog::with_tools(tools));
    let remote = Arc::new(HttpRemoteReasoner::new(config.remote_config())?);
    let runner = ToolRunner::new(
        Arc::clone(&vault),
        Duration::from_millis(config.tool_timeout_ms),
    )?;
    let relay = Arc::new(QueryOrchestrator::new(
        catalog,
        remote,
        runner,
        config.relay_config(),
    ));

    let (id, mut handle) = relay.spawn(args.question.clone());
    info!(%id, "query submitted");

    let query = tokio::select! {
        joined = &mut handle => joined.context("query task terminated abnormally")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, cancelling query");
            relay.cancel(&id);
            (&mut handle).await.context("query task terminated abnormally")?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }

    match query.status {
        QueryStatus::Completed => match &query.result {
            Some(answer) => {
                println!("{}", answer.answer);
                if let Some(reasoning) = &answer.reasoning {
                    println!("  reasoning: {}", reasoning);
                }
            }
            None => println!("Query completed without an answer."),
        },
        QueryStatus::Cancelled => println!("Query cancelled."),
        QueryStatus::Failed => match &query.result {
            Some(fallback) => {
                println!("Remote reasoning failed; degraded answer:");
                println!("{}", fallback.answer);
            }
            None => println!("Remote reasoning failed and no fallback is available."),
        },
        other => println!("Query ended in unexpected state: {:?}", other),
    }

    Ok(())
}

async fn cmd_tools_derive(args: DeriveArgs) -> Result<()> {
    let ledger = Arc::new(CaptureLedger::new(offline_ledger_config()));
    let tap = CaptureTap::new(Arc::clone(&ledger));
    let (applied, malformed) = apply_capture_file(&args.input, &tap).await?;
    info!("replayed {} event(s), {} malformed", applied, malformed);

    let drafts = derive_tool_drafts(&ledger.list());
    let payload = serde_json::to_string_pretty(&drafts)?;
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &payload)
                .await
                .with_context(|| format!("failed to write drafts to {}", path.display()))?;
            info!("wrote {} draft(s) to {}", drafts.len(), path.display());
        }
        None => println!("{}", payload),
    }

    Ok(())
}

async fn load_tool_list(path: &Path) -> Result<Vec<ToolDescriptor>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read tool list {}", path.display()))?;
    let tools: Vec<ToolDescriptor> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse tool list {}", path.display()))?;
    info!("loaded {} tool(s) from {}", tools.len(), path.display());
    Ok(tools)
}

fn print_capture_stats() -> Result<()> {
    let registry = prometheus::default_registry();
    capture_ledger::metrics::register_metrics(registry);
    query_relay::metrics::register_metrics(registry);

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .context("failed to encode metrics")?;
    print!("{}", String::from_utf8_lossy(&buffer));
    Ok(())
}
