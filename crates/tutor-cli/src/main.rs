mod commands;
mod prompt;
mod render;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{ask, chat, history, EndpointArgs};

#[derive(Parser)]
#[command(author, version, about = "Talk to a tutor about a lecture transcript", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat about a transcript
    Chat {
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Do not load or save the conversation thread
        #[arg(long)]
        no_history: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// The question to ask
        question: String,

        /// Wait for the complete answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Inspect the stored conversation thread for a transcript
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Print the stored messages
    Show {
        /// Path to the transcript the thread belongs to
        #[arg(short, long)]
        transcript: PathBuf,
    },
    /// Delete the stored thread
    Clear {
        /// Path to the transcript the thread belongs to
        #[arg(short, long)]
        transcript: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            endpoint,
            no_history,
        } => chat::handle_chat(endpoint, no_history).await,
        Command::Ask {
            endpoint,
            question,
            no_stream,
        } => ask::handle_ask(endpoint, &question, no_stream).await,
        Command::History { command } => match command {
            HistoryCommand::Show { transcript } => history::handle_show(&transcript),
            HistoryCommand::Clear { transcript } => history::handle_clear(&transcript),
        },
    }
}
