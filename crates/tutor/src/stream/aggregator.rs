use std::time::Duration;

use serde::Serialize;
use strum_macros::Display;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::frame::Frame;
use super::session::StreamSession;
use super::throttle::Throttle;
use crate::errors::{StreamError, StreamResult};
use crate::models::message::ChatMessage;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Sending,
    Streaming,
    Error,
}

/// What observers see of a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub streaming_buffer: String,
    pub status: Status,
}

/// Discrete transitions published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StatusChanged(Status),
    /// Throttled snapshot of the full text received so far
    Partial(String),
    MessageAppended(ChatMessage),
    Cancelled { preserved: bool },
    HistoryCleared,
}

/// Whether the caller should keep feeding the current stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

/// The conversation state machine.
///
/// `idle -> sending -> streaming -> idle`, leaving `streaming` by finalize,
/// cancel or error. History is append-only and each stream session adds at
/// most one entry when it ends.
pub struct Aggregator {
    messages: Vec<ChatMessage>,
    status: Status,
    session: Option<StreamSession>,
    throttle: Throttle,
    published_buffer: String,
    revision: u64,
    events: broadcast::Sender<ChatEvent>,
    state: watch::Sender<ConversationState>,
}

impl Aggregator {
    pub fn new(min_update_interval: Duration) -> Self {
        Self::with_history(Vec::new(), min_update_interval)
    }

    /// Resume a conversation from previously stored messages
    pub fn with_history(messages: Vec<ChatMessage>, min_update_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(ConversationState {
            messages: messages.clone(),
            ..Default::default()
        });
        Self {
            messages,
            status: Status::Idle,
            session: None,
            throttle: Throttle::new(min_update_interval),
            published_buffer: String::new(),
            revision: 0,
            events,
            state,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<ChatEvent> {
        self.events.clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConversationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Full text of the in-flight response, regardless of throttling
    pub fn streaming_text(&self) -> &str {
        self.session
            .as_ref()
            .map(StreamSession::accumulated)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Bumped on every history change; used to decide when to persist
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Accept a user message and open a stream session for its reply.
    pub fn begin(&mut self, text: &str) -> StreamResult<CancellationToken> {
        if self.session.is_some() {
            return Err(StreamError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(StreamError::EmptyMessage);
        }

        self.append(ChatMessage::user(text));
        let session = StreamSession::new();
        let token = session.cancellation().clone();
        info!(session = %session.id(), "dispatching message");
        self.session = Some(session);
        self.throttle.reset();
        self.set_status(Status::Sending);
        Ok(token)
    }

    /// Feed decoded response text through the session's frame decoder.
    pub fn feed(&mut self, text: &str) -> Flow {
        let frames = match self.session.as_mut() {
            Some(session) => session.decode(text),
            None => return Flow::Finished,
        };
        self.apply_all(frames)
    }

    pub fn apply(&mut self, frame: Frame) -> Flow {
        let Some(session) = self.session.as_mut() else {
            return Flow::Finished;
        };

        match frame {
            Frame::Chunk(text) => {
                session.append(&text);
                if self.status == Status::Sending {
                    self.set_status(Status::Streaming);
                }
                self.publish_partial();
                Flow::Continue
            }
            Frame::Done => {
                self.finalize();
                Flow::Finished
            }
            Frame::Error(message) => {
                self.fail(StreamError::ServerSignaled(message));
                Flow::Finished
            }
        }
    }

    /// The transport closed: flush the decoder and finalize what arrived.
    pub fn close(&mut self) {
        let frames = match self.session.as_mut() {
            Some(session) => session.flush(),
            None => return,
        };
        if self.apply_all(frames) == Flow::Continue {
            self.finalize();
        }
    }

    /// Turn the accumulated text into an assistant message.
    ///
    /// Returns false when there was no session left to finalize.
    pub fn finalize(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let id = session.id();
        let skipped = session.skipped_frames();
        let text = session.into_text();
        self.published_buffer.clear();

        if !text.is_empty() {
            info!(session = %id, chars = text.len(), "response finalized");
            self.append(ChatMessage::assistant(text));
            self.settle();
        } else if skipped > 0 {
            self.report_failure(&StreamError::NoContent);
        } else {
            debug!(session = %id, "empty response discarded");
            self.settle();
        }
        true
    }

    /// End the active session with a failure. Cancellation is routed to
    /// [`Aggregator::cancel`] so it never shows up as an error.
    pub fn fail(&mut self, err: StreamError) -> bool {
        if err.is_cancellation() {
            return self.cancel();
        }
        let Some(session) = self.session.take() else {
            return false;
        };
        error!(session = %session.id(), "stream failed: {}", err);
        session.cancellation().cancel();
        self.published_buffer.clear();
        self.report_failure(&err);
        true
    }

    /// Abort the active stream, keeping any partial text as a message.
    ///
    /// A no-op when nothing is streaming.
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let id = session.id();
        let text = session.abort();
        let preserved = !text.is_empty();
        self.published_buffer.clear();

        if preserved {
            self.append(ChatMessage::assistant(text));
        }
        info!(session = %id, preserved, "stream cancelled");
        self.emit(ChatEvent::Cancelled { preserved });
        self.settle();
        true
    }

    pub fn clear(&mut self) -> StreamResult<()> {
        if self.session.is_some() {
            return Err(StreamError::Busy);
        }
        self.messages.clear();
        self.revision += 1;
        self.emit(ChatEvent::HistoryCleared);
        self.publish_state();
        Ok(())
    }

    fn apply_all(&mut self, frames: Vec<Frame>) -> Flow {
        for frame in frames {
            if self.apply(frame) == Flow::Finished {
                return Flow::Finished;
            }
        }
        Flow::Continue
    }

    fn report_failure(&mut self, err: &StreamError) {
        self.append(ChatMessage::error(err.user_message()));
        self.set_status(Status::Error);
        self.settle();
    }

    fn settle(&mut self) {
        self.published_buffer.clear();
        self.throttle.reset();
        self.set_status(Status::Idle);
    }

    fn append(&mut self, message: ChatMessage) {
        self.messages.push(message.clone());
        self.revision += 1;
        self.emit(ChatEvent::MessageAppended(message));
        self.publish_state();
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            self.status = status;
            self.emit(ChatEvent::StatusChanged(status));
        }
        self.publish_state();
    }

    fn publish_partial(&mut self) {
        if !self.throttle.ready() {
            return;
        }
        let text = self.streaming_text().to_string();
        self.published_buffer.clone_from(&text);
        self.emit(ChatEvent::Partial(text));
        self.publish_state();
    }

    fn publish_state(&self) {
        self.state.send_replace(ConversationState {
            messages: self.messages.clone(),
            streaming_buffer: self.published_buffer.clone(),
            status: self.status,
        });
    }

    fn emit(&self, event: ChatEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;

    fn aggregator() -> Aggregator {
        Aggregator::new(Duration::ZERO)
    }

    fn chunk(text: &str) -> Frame {
        Frame::Chunk(text.to_string())
    }

    fn drain(rx: &mut broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_example_scenario() {
        let mut agg = aggregator();
        agg.begin("What is the answer?").unwrap();
        assert_eq!(agg.status(), Status::Sending);

        assert_eq!(agg.apply(chunk("The ")), Flow::Continue);
        assert_eq!(agg.status(), Status::Streaming);
        agg.apply(chunk("answer is 42."));
        assert_eq!(agg.apply(Frame::Done), Flow::Finished);

        let last = agg.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "The answer is 42.");
        assert_eq!(agg.status(), Status::Idle);
        let state = agg.state();
        assert_eq!(state.streaming_buffer, "");
        assert_eq!(state.status, Status::Idle);
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn test_second_begin_is_rejected_while_active() {
        let mut agg = aggregator();
        agg.begin("first").unwrap();
        assert_eq!(agg.begin("second"), Err(StreamError::Busy));

        agg.apply(chunk("reply"));
        assert_eq!(agg.begin("third"), Err(StreamError::Busy));
        assert_eq!(agg.messages().len(), 1);

        agg.apply(Frame::Done);
        assert!(agg.begin("fourth").is_ok());
    }

    #[test]
    fn test_blank_message_is_rejected() {
        let mut agg = aggregator();
        assert_eq!(agg.begin("   \n"), Err(StreamError::EmptyMessage));
        assert!(agg.messages().is_empty());
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_user_message_is_trimmed() {
        let mut agg = aggregator();
        agg.begin("  hello  ").unwrap();
        assert_eq!(agg.messages()[0].content, "hello");
        assert_eq!(agg.messages()[0].role, Role::User);
    }

    #[test]
    fn test_done_then_close_appends_once() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {\"chunk\":\"Hello\"}\n\ndata: {\"done\":true}\n\n");
        agg.close();
        assert!(!agg.finalize());

        let assistants: Vec<_> = agg
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, "Hello");
    }

    #[test]
    fn test_identical_replies_in_a_row_are_both_kept() {
        let mut agg = aggregator();
        for _ in 0..2 {
            agg.begin("again?").unwrap();
            agg.apply(chunk("Yes."));
            agg.apply(Frame::Done);
        }
        let replies: Vec<_> = agg
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(replies, vec!["Yes.", "Yes."]);
    }

    #[test]
    fn test_close_after_chunks_finalizes() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {\"chunk\":\"partial\"}\n\n");
        agg.close();
        assert_eq!(agg.messages().last().unwrap().content, "partial");
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_close_flushes_unterminated_final_record() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {\"chunk\":\"a\"}\n\ndata: {\"chunk\":\"b\"}");
        assert_eq!(agg.streaming_text(), "a");
        agg.close();
        assert_eq!(agg.messages().last().unwrap().content, "ab");
    }

    #[test]
    fn test_cancel_preserves_partial_text() {
        let mut agg = aggregator();
        let token = agg.begin("q").unwrap();
        agg.apply(chunk("Hel"));
        agg.apply(chunk("lo"));

        assert!(agg.cancel());
        assert!(token.is_cancelled());
        assert_eq!(agg.messages().len(), 2);
        let last = agg.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Hello");
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_cancel_before_any_chunk_is_silent() {
        let mut agg = aggregator();
        let mut rx = agg.subscribe();
        let token = agg.begin("q").unwrap();
        assert!(agg.cancel());
        assert!(token.is_cancelled());
        assert_eq!(agg.messages().len(), 1);
        assert_eq!(agg.messages()[0].role, Role::User);
        assert!(drain(&mut rx).contains(&ChatEvent::Cancelled { preserved: false }));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut agg = aggregator();
        assert!(!agg.cancel());

        agg.begin("q").unwrap();
        agg.apply(chunk("x"));
        agg.apply(Frame::Done);
        let len = agg.messages().len();
        assert!(!agg.cancel());
        assert!(!agg.cancel());
        assert_eq!(agg.messages().len(), len);
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_cancellation_error_is_not_a_failure() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.apply(chunk("so far"));
        assert!(agg.fail(StreamError::Cancelled));
        assert!(agg.messages().iter().all(|m| !m.is_error()));
        assert_eq!(agg.messages().last().unwrap().content, "so far");
    }

    #[test]
    fn test_malformed_frame_between_chunks() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {\"chunk\":\"one \"}\n\n");
        agg.feed("data: {not json}\n\n");
        agg.feed("data: {\"chunk\":\"two\"}\n\ndata: {\"done\":true}\n\n");
        assert_eq!(agg.messages().last().unwrap().content, "one two");
        assert!(agg.messages().iter().all(|m| !m.is_error()));
    }

    #[test]
    fn test_only_malformed_frames_reports_no_content() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {broken\n\ndata: {\"done\":true}\n\n");
        let last = agg.messages().last().unwrap();
        assert!(last.is_error());
        assert!(last.content.contains("no usable content"));
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_empty_stream_is_discarded_silently() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.feed("data: {\"done\":true}\n\n");
        assert_eq!(agg.messages().len(), 1);
        assert_eq!(agg.status(), Status::Idle);
    }

    #[test]
    fn test_server_error_produces_one_error_entry() {
        let mut agg = aggregator();
        let mut rx = agg.subscribe();
        let token = agg.begin("q").unwrap();
        agg.apply(chunk("ignored"));
        assert_eq!(
            agg.feed("data: {\"error\":\"boom\"}\n\ndata: {\"chunk\":\"late\"}\n\n"),
            Flow::Finished
        );
        agg.close();

        let errors: Vec<_> = agg.messages().iter().filter(|m| m.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].content.contains("boom"));
        assert_eq!(agg.messages().len(), 2);
        assert_eq!(agg.status(), Status::Idle);
        assert!(token.is_cancelled());

        let events = drain(&mut rx);
        let error_at = events
            .iter()
            .position(|e| *e == ChatEvent::StatusChanged(Status::Error))
            .unwrap();
        assert_eq!(events.last(), Some(&ChatEvent::StatusChanged(Status::Idle)));
        assert!(error_at < events.len() - 1);
    }

    #[test]
    fn test_transport_error_mid_stream() {
        let mut agg = aggregator();
        agg.begin("q").unwrap();
        agg.apply(chunk("half"));
        assert!(agg.fail(StreamError::Transport("connection reset".into())));
        let last = agg.messages().last().unwrap();
        assert!(last.is_error());
        assert_eq!(
            last.content,
            "I'm sorry, I encountered an error: connection reset"
        );
        assert!(agg.begin("retry").is_ok());
    }

    #[test]
    fn test_partial_snapshots_are_throttled() {
        let mut agg = Aggregator::new(Duration::from_secs(3600));
        let mut rx = agg.subscribe();
        agg.begin("q").unwrap();
        agg.apply(chunk("a"));
        agg.apply(chunk("b"));
        agg.apply(chunk("c"));

        let partials: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ChatEvent::Partial(_)))
            .collect();
        assert_eq!(partials, vec![ChatEvent::Partial("a".to_string())]);
        assert_eq!(agg.state().streaming_buffer, "a");
        assert_eq!(agg.streaming_text(), "abc");

        agg.apply(Frame::Done);
        assert_eq!(agg.messages().last().unwrap().content, "abc");
    }

    #[test]
    fn test_buffer_only_visible_while_streaming() {
        let mut agg = aggregator();
        let watch = agg.watch();
        agg.begin("q").unwrap();
        assert_eq!(watch.borrow().status, Status::Sending);
        assert!(watch.borrow().streaming_buffer.is_empty());

        agg.apply(chunk("abc"));
        assert_eq!(watch.borrow().status, Status::Streaming);
        assert_eq!(watch.borrow().streaming_buffer, "abc");

        agg.apply(Frame::Done);
        assert_eq!(watch.borrow().status, Status::Idle);
        assert!(watch.borrow().streaming_buffer.is_empty());
    }

    #[test]
    fn test_event_order_for_a_stream() {
        let mut agg = aggregator();
        let mut rx = agg.subscribe();
        agg.begin("q").unwrap();
        agg.apply(chunk("hi"));
        agg.apply(Frame::Done);

        let events = drain(&mut rx);
        assert!(matches!(&events[0], ChatEvent::MessageAppended(m) if m.role == Role::User));
        assert_eq!(events[1], ChatEvent::StatusChanged(Status::Sending));
        assert_eq!(events[2], ChatEvent::StatusChanged(Status::Streaming));
        assert_eq!(events[3], ChatEvent::Partial("hi".to_string()));
        assert!(matches!(&events[4], ChatEvent::MessageAppended(m) if m.content == "hi"));
        assert_eq!(events[5], ChatEvent::StatusChanged(Status::Idle));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_clear_requires_idle() {
        let mut agg = Aggregator::with_history(vec![ChatMessage::user("old")], Duration::ZERO);
        agg.begin("q").unwrap();
        assert_eq!(agg.clear(), Err(StreamError::Busy));
        agg.cancel();
        assert!(agg.clear().is_ok());
        assert!(agg.messages().is_empty());
        assert!(agg.state().messages.is_empty());
    }

    #[test]
    fn test_revision_tracks_history_changes() {
        let mut agg = aggregator();
        assert_eq!(agg.revision(), 0);
        agg.begin("q").unwrap();
        assert_eq!(agg.revision(), 1);
        agg.apply(chunk("a"));
        assert_eq!(agg.revision(), 1);
        agg.apply(Frame::Done);
        assert_eq!(agg.revision(), 2);
    }
}
