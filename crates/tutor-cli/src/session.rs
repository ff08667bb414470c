use anyhow::Result;
use cliclack::spinner;
use tokio::sync::broadcast::error::RecvError;
use tutor::conversation::ConversationHandle;
use tutor::errors::StreamError;
use tutor::models::role::Role;
use tutor::stream::{ChatEvent, Status};
use tutor::transport::ChatMode;

use crate::prompt::{get_input, print_help, Input};
use crate::render::{print_error, print_message, print_notice, DeltaPrinter};

/// An interactive chat on top of a running conversation
pub struct Session {
    handle: ConversationHandle,
    mode: ChatMode,
}

impl Session {
    pub fn new(handle: ConversationHandle, mode: ChatMode) -> Self {
        Session { handle, mode }
    }

    pub async fn start(&mut self) -> Result<()> {
        let history = self.handle.snapshot().messages;
        if !history.is_empty() {
            print_notice(&format!("Resuming {} earlier messages", history.len()));
            for message in &history {
                print_message(message)?;
            }
        }

        loop {
            match get_input(self.mode)? {
                Input::Message(text) => self.exchange(&text).await?,
                Input::SetMode(mode) => {
                    self.handle.set_mode(mode).await?;
                    self.mode = mode;
                    print_notice(&format!("Switched to {} mode", mode));
                }
                Input::Clear => match self.handle.clear().await {
                    Ok(()) => print_notice("Conversation cleared"),
                    Err(e) => print_error(&e.to_string()),
                },
                Input::Help => print_help(),
                Input::Invalid(reason) => print_error(&reason),
                Input::Exit => break,
            }
        }
        Ok(())
    }

    /// Send one message and render the reply until the conversation settles.
    ///
    /// Ctrl-C stops the reply; whatever arrived is kept in the history.
    async fn exchange(&mut self, text: &str) -> Result<()> {
        let mut events = self.handle.subscribe();
        match self.handle.send_message(text).await {
            Ok(()) | Err(StreamError::MissingTranscript) => {}
            Err(StreamError::EmptyMessage) => return Ok(()),
            Err(e) => {
                print_error(&e.to_string());
                return Ok(());
            }
        }

        let spin = spinner();
        spin.start("awaiting reply");
        let mut waiting = true;
        let mut printer = DeltaPrinter::new();

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    self.handle.cancel().await;
                    continue;
                }
            };

            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };

            let visible = match &event {
                ChatEvent::MessageAppended(message) => message.role != Role::User,
                ChatEvent::StatusChanged(status) => *status == Status::Idle,
                _ => true,
            };
            if waiting && visible {
                spin.stop("");
                waiting = false;
            }

            match event {
                ChatEvent::Partial(snapshot) => printer.update(&snapshot)?,
                ChatEvent::MessageAppended(message) => match message.role {
                    Role::Assistant if printer.has_printed() => printer.finish(&message.content)?,
                    Role::Assistant | Role::Error => print_message(&message)?,
                    _ => {}
                },
                ChatEvent::Cancelled { preserved } => {
                    if !preserved {
                        print_notice("Interrupted before the tutor replied");
                    } else {
                        print_notice("Interrupted: keeping the partial reply");
                    }
                }
                ChatEvent::StatusChanged(Status::Idle) => break,
                _ => {}
            }
        }

        if waiting {
            spin.stop("");
        }
        Ok(())
    }
}
