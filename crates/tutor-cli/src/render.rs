use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use console::style;
use tutor::models::message::ChatMessage;
use tutor::models::role::Role;

const THEME: &str = "zenburn";

/// Pretty-print markdown through bat
pub fn print_markdown(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map_err(|e| anyhow::anyhow!("Failed to render reply: {}", e))?;
    println!();
    Ok(())
}

pub fn print_error(content: &str) {
    println!("{}", style(content).red());
}

pub fn print_notice(content: &str) {
    println!("{}", style(content).dim());
}

/// A stored message, labelled with who sent it
pub fn print_message(message: &ChatMessage) -> Result<()> {
    match message.role {
        Role::User => println!("{} {}", style("you:").cyan().bold(), message.content),
        Role::Assistant => {
            println!("{}", style("tutor:").green().bold());
            print_markdown(&message.content)?;
        }
        Role::System => print_notice(&message.content),
        Role::Error => print_error(&message.content),
    }
    Ok(())
}

/// Prints a streaming reply as it grows.
///
/// Snapshots carry the whole text so far; only the unseen tail is written.
#[derive(Debug, Default)]
pub struct DeltaPrinter {
    printed: usize,
}

impl DeltaPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_printed(&self) -> bool {
        self.printed > 0
    }

    /// The part of `snapshot` not yet written
    pub fn delta<'a>(&self, snapshot: &'a str) -> &'a str {
        snapshot.get(self.printed..).unwrap_or_default()
    }

    pub fn update(&mut self, snapshot: &str) -> Result<()> {
        let delta = self.delta(snapshot);
        if delta.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout();
        write!(stdout, "{}", delta)?;
        stdout.flush()?;
        self.printed = snapshot.len();
        Ok(())
    }

    /// Write whatever remains of the final text and end the line
    pub fn finish(&mut self, text: &str) -> Result<()> {
        self.update(text)?;
        println!();
        self.printed = 0;
        Ok(())
    }
}
