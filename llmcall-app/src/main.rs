//! llmcall main binary.

mod config;
mod cookies;
mod routes;
mod server;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const DEFAULT_LOG_FILTER: &str = "info,llmcall_app=debug,llmcall_llm=debug,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "llmcall", version, about = "Single-route completion server over LLM vendor APIs")]
struct Cli {
    /// Config file (default: ~/.llmcall/config.toml).
    #[arg(long, global = true, env = "LLMCALL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "LLMCALL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Validate config and report how each provider resolves.
    Doctor,
    /// Print the model list visible with server-side credentials.
    Models,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env has to land before clap reads LLMCALL_* defaults.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    install_panic_hook();
    report_dotenv(dotenv);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::Models => server::print_models(cli.config).await,
    }
}

fn report_dotenv(result: dotenvy::Result<PathBuf>) {
    match result {
        Ok(path) => tracing::info!(path = %path.display(), ".env loaded"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, ".env could not be loaded"),
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    match format {
        LogFormat::Json => fmt
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => fmt
            .with_span_events(FmtSpan::CLOSE)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .init(),
        LogFormat::Compact => fmt.compact().init(),
    }
    tracing::debug!(log_format = ?format, "tracing initialized");
}

/// Route panics through tracing so they land in the structured log before the default
/// hook prints them.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |l| format!("{}:{}", l.file(), l.line()));
        tracing::error!(
            panic_location = %location,
            panic_payload = %panic_message(info.payload()),
            "panic captured"
        );
        default_hook(info);
    }));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg;
    }
    match payload.downcast_ref::<String>() {
        Some(msg) => msg,
        None => "non-string panic payload",
    }
}
