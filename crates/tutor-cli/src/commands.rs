pub mod ask;
pub mod chat;
pub mod history;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tutor::config::Settings;
use tutor::transport::ChatMode;

/// Flags shared by the commands that talk to the tutor
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Path to the transcript to discuss
    #[arg(short, long)]
    pub transcript: PathBuf,

    /// Tutoring style: socratic, direct or talk
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<ChatMode>,

    /// Base URL of the tutor backend
    #[arg(long)]
    pub endpoint: Option<String>,
}

pub fn parse_mode(value: &str) -> Result<ChatMode, String> {
    ChatMode::from_str(&value.to_lowercase())
        .map_err(|_| format!("unknown mode '{}', expected socratic, direct or talk", value))
}

pub fn load_transcript(path: &Path) -> Result<String> {
    let transcript = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    if transcript.trim().is_empty() {
        bail!("Transcript {} is empty", path.display());
    }
    Ok(transcript)
}

/// Configuration with command-line overrides applied
pub fn load_settings(args: &EndpointArgs) -> Result<Settings> {
    let mut settings = Settings::new().context("Failed to load configuration")?;
    if let Some(endpoint) = &args.endpoint {
        settings.endpoint.base_url = endpoint.clone();
    }
    if let Some(mode) = args.mode {
        settings.endpoint.mode = mode;
    }
    Ok(settings)
}
