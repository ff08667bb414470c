use anyhow::{Context, Result};
use std::path::Path;
use tutor::config::Settings;
use tutor::history::HistoryStore;

use super::load_transcript;
use crate::render::{print_message, print_notice};

fn store() -> Result<HistoryStore> {
    let settings = Settings::new().context("Failed to load configuration")?;
    settings
        .history_store()
        .context("Conversation history is disabled or has no location")
}

pub fn handle_show(transcript: &Path) -> Result<()> {
    let reference = load_transcript(transcript)?;
    show(&store()?, &reference)
}

pub fn handle_clear(transcript: &Path) -> Result<()> {
    let reference = load_transcript(transcript)?;
    clear(&store()?, &reference)
}

fn show(store: &HistoryStore, reference: &str) -> Result<()> {
    let messages = store.load(reference)?;
    if messages.is_empty() {
        print_notice("No conversation stored for this transcript");
        return Ok(());
    }
    print_notice(&format!(
        "{} messages in {}",
        messages.len(),
        store.path_for(reference).display()
    ));
    for message in &messages {
        print_message(message)?;
    }
    Ok(())
}

fn clear(store: &HistoryStore, reference: &str) -> Result<()> {
    if store.clear(reference)? {
        print_notice("Conversation history cleared");
    } else {
        print_notice("No conversation stored for this transcript");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tutor::models::message::ChatMessage;

    #[test]
    fn test_clear_removes_thread() -> Result<()> {
        let dir = TempDir::new()?;
        let store = HistoryStore::new(dir.path());
        store.save("lecture", &[ChatMessage::user("hi")])?;

        clear(&store, "lecture")?;
        assert!(!store.path_for("lecture").exists());
        // clearing again is harmless
        clear(&store, "lecture")?;
        Ok(())
    }

    #[test]
    fn test_show_empty_thread() -> Result<()> {
        let dir = TempDir::new()?;
        show(&HistoryStore::new(dir.path()), "lecture")
    }
}
