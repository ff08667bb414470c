use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{StreamError, StreamResult};
use crate::history::HistoryStore;
use crate::stream::{text_chunks, Aggregator, ChatEvent, ConversationState, Status, TextStream};
use crate::transport::{ChatMode, ChatRequest, Transport};

const COMMAND_CAPACITY: usize = 32;

/// How a conversation is set up when it is spawned
#[derive(Debug, Clone)]
pub struct ConversationOptions {
    pub mode: ChatMode,
    /// Reference text sent with every request; also keys the stored thread
    pub transcript: String,
    pub min_update_interval: Duration,
    pub stream_timeout: Option<Duration>,
    pub store: Option<HistoryStore>,
}

impl ConversationOptions {
    pub fn new<S: Into<String>>(transcript: S) -> Self {
        Self {
            mode: ChatMode::default(),
            transcript: transcript.into(),
            min_update_interval: Duration::from_millis(100),
            stream_timeout: None,
            store: None,
        }
    }

    pub fn from_settings<S: Into<String>>(settings: &Settings, transcript: S) -> Self {
        Self {
            mode: settings.endpoint.mode,
            transcript: transcript.into(),
            min_update_interval: settings.stream.min_update_interval(),
            stream_timeout: settings.stream.timeout(),
            store: settings.history_store(),
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }
}

enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<StreamResult<()>>,
    },
    Cancel,
    SetMode {
        mode: ChatMode,
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<StreamResult<()>>,
    },
}

/// What woke the actor up
enum Wake {
    Command(Option<Command>),
    Chunk(Option<StreamResult<String>>),
    Cancelled,
    TimedOut,
}

struct ActiveStream {
    chunks: TextStream,
    token: CancellationToken,
    deadline: Option<Instant>,
}

/// A single conversation, run as a task that owns its state machine.
///
/// All history changes happen on this task. Callers interact through a
/// [`ConversationHandle`].
pub struct Conversation {
    aggregator: Aggregator,
    transport: Arc<dyn Transport>,
    mode: ChatMode,
    transcript: String,
    stream_timeout: Option<Duration>,
    store: Option<HistoryStore>,
    active: Option<ActiveStream>,
    persisted_revision: u64,
}

impl Conversation {
    /// Start the conversation task, resuming a stored thread when one exists.
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// handle has been dropped.
    pub fn spawn(transport: Arc<dyn Transport>, options: ConversationOptions) -> ConversationHandle {
        let history = match &options.store {
            Some(store) => store.load(&options.transcript).unwrap_or_else(|e| {
                warn!("Failed to load conversation history: {:#}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        if !history.is_empty() {
            info!(messages = history.len(), "resumed conversation");
        }

        let aggregator = Aggregator::with_history(history, options.min_update_interval);
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let handle = ConversationHandle {
            commands,
            events: aggregator.event_sender(),
            state: aggregator.watch(),
        };

        let conversation = Conversation {
            persisted_revision: aggregator.revision(),
            aggregator,
            transport,
            mode: options.mode,
            transcript: options.transcript,
            stream_timeout: options.stream_timeout,
            store: options.store,
            active: None,
        };
        tokio::spawn(conversation.run(receiver));

        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let wake = match self.active.as_mut() {
                Some(active) => {
                    tokio::select! {
                        command = commands.recv() => Wake::Command(command),
                        chunk = active.chunks.next() => Wake::Chunk(chunk),
                        _ = active.token.cancelled() => Wake::Cancelled,
                        _ = deadline(active.deadline) => Wake::TimedOut,
                    }
                }
                None => Wake::Command(commands.recv().await),
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => {
                    self.aggregator.cancel();
                    self.persist();
                    debug!("all handles dropped, conversation closed");
                    return;
                }
                Wake::Chunk(Some(Ok(text))) => {
                    self.aggregator.feed(&text);
                }
                Wake::Chunk(Some(Err(err))) => {
                    self.aggregator.fail(err);
                }
                Wake::Chunk(None) => self.aggregator.close(),
                Wake::Cancelled => {
                    self.aggregator.cancel();
                }
                Wake::TimedOut => {
                    warn!("stream timed out, keeping partial response");
                    self.aggregator.cancel();
                }
            }

            if !self.aggregator.is_active() {
                self.active = None;
            }
            self.persist();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { text, reply } => {
                let _ = reply.send(self.dispatch(&text));
            }
            Command::Cancel => {
                self.aggregator.cancel();
            }
            Command::SetMode { mode, reply } => {
                info!(%mode, "chat mode changed");
                self.mode = mode;
                let _ = reply.send(());
            }
            Command::Clear { reply } => {
                let result = self.aggregator.clear();
                if result.is_ok() {
                    if let Some(store) = &self.store {
                        if let Err(e) = store.clear(&self.transcript) {
                            warn!("Failed to clear stored history: {:#}", e);
                        }
                    }
                    self.persisted_revision = self.aggregator.revision();
                }
                let _ = reply.send(result);
            }
        }
    }

    fn dispatch(&mut self, text: &str) -> StreamResult<()> {
        let token = self.aggregator.begin(text)?;
        if self.transcript.trim().is_empty() {
            self.aggregator.fail(StreamError::MissingTranscript);
            return Err(StreamError::MissingTranscript);
        }

        let request = ChatRequest::from_history(self.aggregator.messages(), self.transcript.as_str());
        let chunks = open_stream(self.transport.clone(), self.mode, request, token.clone());
        self.active = Some(ActiveStream {
            chunks,
            token,
            deadline: self.stream_timeout.map(|timeout| Instant::now() + timeout),
        });
        Ok(())
    }

    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let revision = self.aggregator.revision();
        if revision == self.persisted_revision {
            return;
        }
        match store.save(&self.transcript, self.aggregator.messages()) {
            Ok(()) => self.persisted_revision = revision,
            Err(e) => warn!("Failed to save conversation history: {:#}", e),
        }
    }
}

/// Open the transport lazily so the actor keeps serving commands while the
/// connection is being established.
fn open_stream(
    transport: Arc<dyn Transport>,
    mode: ChatMode,
    request: ChatRequest,
    token: CancellationToken,
) -> TextStream {
    async_stream::stream! {
        let opened = tokio::select! {
            _ = token.cancelled() => None,
            opened = transport.open(mode, &request) => Some(opened),
        };
        match opened {
            Some(Ok(bytes)) => {
                let mut chunks = text_chunks(bytes);
                while let Some(chunk) = chunks.next().await {
                    yield chunk;
                }
            }
            Some(Err(err)) => yield Err(err),
            None => {}
        }
    }
    .boxed()
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => futures::future::pending().await,
    }
}

/// Cloneable access to a running [`Conversation`]
#[derive(Clone)]
pub struct ConversationHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ChatEvent>,
    state: watch::Receiver<ConversationState>,
}

impl ConversationHandle {
    /// Submit a user message.
    ///
    /// Returns once the message is accepted into history; the reply streams
    /// in afterwards and is observable through [`subscribe`](Self::subscribe)
    /// or [`watch`](Self::watch).
    pub async fn send_message<S: Into<String>>(&self, text: S) -> StreamResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| StreamError::Closed)?;
        response.await.map_err(|_| StreamError::Closed)?
    }

    /// Abort the in-flight response, keeping its partial text. Never fails.
    pub async fn cancel(&self) {
        if self.commands.send(Command::Cancel).await.is_err() {
            debug!("cancel after conversation closed");
        }
    }

    pub async fn set_mode(&self, mode: ChatMode) -> StreamResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SetMode { mode, reply })
            .await
            .map_err(|_| StreamError::Closed)?;
        response.await.map_err(|_| StreamError::Closed)
    }

    /// Drop the history and any stored thread; rejected while streaming
    pub async fn clear(&self) -> StreamResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Clear { reply })
            .await
            .map_err(|_| StreamError::Closed)?;
        response.await.map_err(|_| StreamError::Closed)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConversationState> {
        self.state.clone()
    }

    /// Wait for the current exchange to settle and return the resulting state
    pub async fn wait_until_idle(&self) -> StreamResult<ConversationState> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| state.status == Status::Idle)
            .await
            .map_err(|_| StreamError::Closed)?;
        Ok(settled.clone())
    }
}
