use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tutor::conversation::{Conversation, ConversationOptions};
use tutor::models::message::ChatMessage;
use tutor::models::role::Role;
use tutor::transport::{ChatClient, ChatRequest};

use super::{load_settings, load_transcript, EndpointArgs};
use crate::render::print_markdown;

pub async fn handle_ask(args: EndpointArgs, question: &str, no_stream: bool) -> Result<()> {
    let settings = load_settings(&args)?;
    let transcript = load_transcript(&args.transcript)?;
    let client = ChatClient::new(settings.endpoint.clone())?;

    if no_stream {
        let request = ChatRequest::from_history(&[ChatMessage::user(question.trim())], transcript);
        let reply = client.complete(settings.endpoint.mode, &request).await?;
        return print_markdown(&reply);
    }

    // one-off questions are not added to the stored thread
    let mut options = ConversationOptions::from_settings(&settings, transcript);
    options.store = None;
    let handle = Conversation::spawn(Arc::new(client), options);

    handle.send_message(question).await?;
    let state = handle.wait_until_idle().await?;

    let last = state
        .messages
        .last()
        .ok_or_else(|| anyhow!("The tutor did not reply"))?;
    match last.role {
        Role::Assistant => print_markdown(&last.content),
        Role::Error => bail!("{}", last.content),
        _ => bail!("The tutor did not reply"),
    }
}
