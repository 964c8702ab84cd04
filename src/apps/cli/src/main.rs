//! Parley CLI - stream one chat turn from the terminal

mod config;
mod logging;
mod render;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::CliConfig;
use parley_stream::types::StreamOptions;
use parley_stream::{
    HttpTransport, SessionOutcome, StaticTokenProvider, StreamError, StreamResult,
    StreamSessionController,
};
use render::TerminalRenderer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "parley-cli", version, about = "Stream chat replies from the terminal")]
struct Cli {
    /// Config file (default: <config dir>/parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// trace | debug | info | warn | error | off
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and stream the reply
    Chat(ChatArgs),
}

#[derive(Args)]
struct ChatArgs {
    content: String,

    /// Conversation id (a new one is generated when omitted)
    #[arg(long)]
    conversation: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Ask the server to skip the reasoning phase
    #[arg(long)]
    no_reasoning: bool,

    /// Attachment id, repeatable
    #[arg(long = "attach")]
    attachments: Vec<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    token: Option<String>,
}

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// Exit status of a finished session. The renderer has already printed any
/// failure that reached the observer.
fn exit_status(outcome: &StreamResult<SessionOutcome>) -> u8 {
    match outcome {
        Ok(SessionOutcome::Completed(_)) => 0,
        Ok(SessionOutcome::Aborted) => EXIT_INTERRUPTED,
        Err(_) => EXIT_FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Chat(args) => run_chat(cli.config, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run_chat(config_path: Option<PathBuf>, args: ChatArgs) -> Result<ExitCode> {
    let mut config = CliConfig::load(config_path.as_deref())?;
    config.apply_env();
    if let Some(endpoint) = args.endpoint {
        config.stream.endpoint_url = endpoint;
    }
    if let Some(token) = args.token {
        config.token = Some(token);
    }
    config.stream.validate()?;

    let conversation_id = args
        .conversation
        .unwrap_or_else(|| format!("chat-{}", uuid::Uuid::new_v4()));
    info!(
        "Streaming reply: conversation_id={}, endpoint={}",
        conversation_id, config.stream.endpoint_url
    );

    let transport = HttpTransport::new(&config.stream);
    let controller = Arc::new(StreamSessionController::new(
        config.stream,
        Arc::new(transport),
        Arc::new(StaticTokenProvider::new(config.token)),
    ));

    let interrupt = {
        let controller = Arc::clone(&controller);
        let conversation_id = conversation_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling stream");
                controller.cancel(&conversation_id);
            }
        })
    };

    let options = StreamOptions {
        include_reasoning: args.no_reasoning.then_some(false),
        max_tokens: args.max_tokens,
        attachment_ids: args.attachments,
    };
    let outcome = controller
        .start(
            &conversation_id,
            &args.content,
            options,
            Arc::new(TerminalRenderer::new()),
        )
        .await;
    interrupt.abort();

    // Rejected before the session opened, so the renderer never saw it.
    if let Err(e @ StreamError::SessionBusy { .. }) = &outcome {
        eprintln!("Error: {}", e);
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}
