use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::message::ChatMessage;

const KEY_LEN: usize = 20;

/// Chat threads persisted per reference text (a transcript or a single sentence).
///
/// Each thread is a JSON-lines file named after a hash of its reference text,
/// so the same text always reopens the same conversation.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.config/tutorstream/history`, when a home directory exists
    pub fn default_location() -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self::new(
            home.join(".config").join("tutorstream").join("history"),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_for(reference: &str) -> String {
        let digest = format!("{:x}", Sha256::digest(reference.as_bytes()));
        format!("thread_{}", &digest[..KEY_LEN])
    }

    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", Self::key_for(reference)))
    }

    /// Load the thread for `reference`.
    ///
    /// A missing file is an empty thread. A corrupt file is logged and also
    /// treated as empty so a bad write never blocks a new conversation.
    pub fn load(&self, reference: &str) -> Result<Vec<ChatMessage>> {
        let path = self.path_for(reference);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open {}", path.display()))
            }
        };

        match read_messages(file) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!("Discarding unreadable history {}: {}", path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, reference: &str, messages: &[ChatMessage]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(reference);
        let file = File::create(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        write_messages(file, messages)
    }

    /// Remove the thread; returns whether one existed
    pub fn clear(&self, reference: &str) -> Result<bool> {
        let path = self.path_for(reference);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

fn write_messages(file: File, messages: &[ChatMessage]) -> Result<()> {
    let mut writer = io::BufWriter::new(file);
    for message in messages {
        serde_json::to_writer(&mut writer, message)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_messages(file: File) -> Result<Vec<ChatMessage>> {
    let reader = io::BufReader::new(file);
    let mut messages = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        messages.push(serde_json::from_str::<ChatMessage>(&line)?);
    }
    Ok(messages)
}
