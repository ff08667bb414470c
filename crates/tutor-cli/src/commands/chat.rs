use anyhow::Result;
use console::style;
use std::sync::Arc;
use tracing::debug;
use tutor::conversation::{Conversation, ConversationOptions};
use tutor::transport::ChatClient;

use super::{load_settings, load_transcript, EndpointArgs};
use crate::session::Session;

pub async fn handle_chat(args: EndpointArgs, no_history: bool) -> Result<()> {
    let settings = load_settings(&args)?;
    let transcript = load_transcript(&args.transcript)?;

    let mut options = ConversationOptions::from_settings(&settings, transcript);
    if no_history {
        options.store = None;
    }
    let mode = options.mode;
    debug!(%mode, history = options.store.is_some(), "starting chat");

    let client = ChatClient::new(settings.endpoint.clone())?;
    let handle = Conversation::spawn(Arc::new(client), options);

    println!(
        "Chatting about {} via {} {}",
        style(args.transcript.display()).bold(),
        settings.endpoint.base_url,
        style("- type \"exit\" to end the session").dim()
    );
    println!();

    Session::new(handle, mode).start().await
}
