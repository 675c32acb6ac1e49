//! Tether CLI: a terminal host for the tool-orchestrating assistant.

mod render;

use anyhow::{Context, Result};
use clap::Parser;
use render::{Sink, render};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tether_api::ChatClient;
use tether_config::{CliOverrides, TetherConfig};
use tether_core::{Orchestrator, RunEvent, RunSummary, StopReason, answer_pending_calls};
use tether_tools::LocalToolRegistry;
use tether_types::{Message, TetherError};
use tokio_util::sync::CancellationToken;

/// Result text given to tool calls a run stopped before answering.
const NOT_EXECUTED: &str = "Not executed: the run stopped before this call was handled.";

#[derive(Parser)]
#[command(
    name = "tether",
    version,
    about = "A chat assistant that calls local and provider tools"
)]
struct Cli {
    /// Send a single prompt and print the response (non-interactive)
    #[arg(short, long)]
    print: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum tool iterations per run
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Language the assistant should answer in
    #[arg(long)]
    language: Option<String>,

    /// Extra provider file (TOML or JSON)
    #[arg(long)]
    providers: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = TetherConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        max_iterations: cli.max_iterations,
        language: cli.language,
        providers_file: cli.providers,
    })
    .map_err(TetherError::from)?;

    let client = ChatClient::new(&config.api_key, &config.api_base_url, &config.model)
        .context("Failed to create API client")?
        .with_parallel_tool_calls(Some(config.parallel_tool_calls));

    let orchestrator = Orchestrator::new(Arc::new(client))
        .with_local_tools(LocalToolRegistry::with_builtins())
        .with_host_actions(config.host_actions.clone())
        .with_system_prompt(config.system_prompt.clone())
        .with_max_iterations(config.max_iterations);

    if let Some(prompt) = cli.print {
        let mut messages = vec![Message::user(prompt)];
        let summary = run_turn(&orchestrator, &config, &mut messages).await?;
        close_turn(&mut messages, &summary);
        return Ok(());
    }

    repl(&orchestrator, &config).await
}

/// Run one turn with Ctrl+C wired to cancellation.
async fn run_turn(
    orchestrator: &Orchestrator,
    config: &TetherConfig,
    messages: &mut Vec<Message>,
) -> Result<RunSummary, TetherError> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = orchestrator
        .run_with_providers(&config.providers, messages, cancel, print_event)
        .await;
    interrupt.abort();
    result
}

/// Answer calls the run left open so the next turn is well-formed.
fn close_turn(messages: &mut Vec<Message>, summary: &RunSummary) {
    if summary.stop != StopReason::Completed {
        let answered = answer_pending_calls(messages, NOT_EXECUTED);
        tracing::debug!(answered, stop = ?summary.stop, "closed pending tool calls");
    }
}

fn print_event(event: RunEvent) {
    let Some((sink, line)) = render(&event) else {
        println!();
        return;
    };
    match sink {
        Sink::Stdout => {
            print!("{line}");
            let _ = io::stdout().flush();
        }
        Sink::Stderr => eprintln!("{line}"),
    }
}

async fn repl(orchestrator: &Orchestrator, config: &TetherConfig) -> Result<()> {
    let mut messages: Vec<Message> = Vec::new();
    let stdin = io::stdin();

    eprintln!(
        "tether v{} (model: {}, providers: {}, max iterations: {})",
        env!("CARGO_PKG_VERSION"),
        orchestrator.model_name(),
        config.providers.len(),
        orchestrator.max_iterations()
    );
    eprintln!("Type your message. Press Ctrl+D to exit.\n");

    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match handle_slash_command(input, &mut messages, config) {
            Some(SlashResult::Continue) => continue,
            Some(SlashResult::Break) => break,
            Some(SlashResult::Unknown) => {
                eprintln!("Unknown command: {input}. Type /help for available commands.");
                continue;
            }
            None => {}
        }

        let turn_start = messages.len();
        messages.push(Message::user(input));

        match run_turn(orchestrator, config, &mut messages).await {
            Ok(summary) => close_turn(&mut messages, &summary),
            Err(TetherError::Cancelled) => {
                answer_pending_calls(&mut messages, "Cancelled by user.");
            }
            Err(e) => {
                eprintln!("\nError: {e}");
                // Drop the failed turn
                messages.truncate(turn_start);
            }
        }

        println!();
    }

    Ok(())
}

enum SlashResult {
    Continue,
    Break,
    Unknown,
}

fn handle_slash_command(
    input: &str,
    messages: &mut Vec<Message>,
    config: &TetherConfig,
) -> Option<SlashResult> {
    if !input.starts_with('/') {
        return None;
    }

    let cmd = input.split_whitespace().next().unwrap_or(input);
    match cmd {
        "/quit" | "/exit" => Some(SlashResult::Break),
        "/clear" => {
            messages.clear();
            eprintln!("Conversation cleared.");
            Some(SlashResult::Continue)
        }
        "/providers" => {
            if config.providers.is_empty() {
                eprintln!("No providers configured.");
            }
            for (name, descriptor) in &config.providers.providers {
                let target = match (&descriptor.command, &descriptor.url) {
                    (Some(command), _) => format!("{command} {}", descriptor.args.join(" ")),
                    (None, Some(url)) => url.clone(),
                    (None, None) => "(incomplete)".to_string(),
                };
                eprintln!("  {name} [{}]: {}", descriptor.transport, target.trim_end());
            }
            Some(SlashResult::Continue)
        }
        "/help" => {
            print_help();
            Some(SlashResult::Continue)
        }
        _ => Some(SlashResult::Unknown),
    }
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /clear      Start a new conversation");
    eprintln!("  /providers  List configured tool providers");
    eprintln!("  /help       Show this help");
    eprintln!("  /quit       Exit (also /exit, Ctrl+D)");
    eprintln!();
    eprintln!("Ctrl+C during a reply cancels the current run.");
}
