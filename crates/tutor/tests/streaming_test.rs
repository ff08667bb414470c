use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tutor::conversation::{Conversation, ConversationOptions};
use tutor::models::role::Role;
use tutor::stream::Status;
use tutor::transport::{ChatClient, ChatEndpoint, ChatMode};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRANSCRIPT: &str = "Heat flows from hot to cold. Entropy increases.";

async fn conversation_against(server: &MockServer, mode: ChatMode) -> tutor::conversation::ConversationHandle {
    let client = ChatClient::new(ChatEndpoint::new(server.uri(), mode)).unwrap();
    Conversation::spawn(
        Arc::new(client),
        ConversationOptions::new(TRANSCRIPT)
            .with_mode(mode)
            .with_min_update_interval(Duration::ZERO),
    )
}

#[tokio::test]
async fn test_full_exchange_over_http() {
    let server = MockServer::start().await;
    let body = concat!(
        ": keep-alive\n\n",
        "data: {\"chunk\": \"Entropy \"}\r\n\r\n",
        "data: not json\n\n",
        "data: {\"chunk\": \"always grows \u{2191}\"}\n\n",
        "data: {\"done\": true}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat-direct-stream"))
        .and(body_partial_json(json!({"transcript": TRANSCRIPT})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handle = conversation_against(&server, ChatMode::Direct).await;
    handle.send_message("Does entropy shrink?").await.unwrap();
    let state = handle.wait_until_idle().await.unwrap();

    assert_eq!(state.status, Status::Idle);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].role, Role::Assistant);
    assert_eq!(state.messages[1].content, "Entropy always grows \u{2191}");
}

#[tokio::test]
async fn test_unterminated_final_record_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat-talk-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: {\"chunk\": \"Hi there\"}"))
        .mount(&server)
        .await;

    let handle = conversation_against(&server, ChatMode::Talk).await;
    handle.send_message("hello").await.unwrap();
    let state = handle.wait_until_idle().await.unwrap();

    assert_eq!(state.messages.last().unwrap().content, "Hi there");
    assert_eq!(state.messages.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn test_error_status_becomes_error_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat-stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let handle = conversation_against(&server, ChatMode::Socratic).await;
    handle.send_message("hello").await.unwrap();
    let state = handle.wait_until_idle().await.unwrap();

    assert_eq!(state.messages.len(), 2);
    let entry = &state.messages[1];
    assert!(entry.is_error());
    assert!(entry
        .content
        .starts_with("I'm sorry, I encountered an error: Failed to get response from tutor (503"));
}

#[tokio::test]
async fn test_only_malformed_frames_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat-direct-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: {oops\n\ndata: {\"done\": true}\n\n"))
        .mount(&server)
        .await;

    let handle = conversation_against(&server, ChatMode::Direct).await;
    handle.send_message("hello").await.unwrap();
    let state = handle.wait_until_idle().await.unwrap();

    assert_eq!(state.messages.len(), 2);
    assert!(state.messages[1].is_error());
}
