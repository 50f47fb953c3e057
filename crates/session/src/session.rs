//! The session state machine and its event dispatch loop.
//!
//! One `VoiceSession` owns at most one live transport at a time. Everything
//! the transport observes arrives on a single queue consumed here, so status,
//! transcript, and tool effects are only ever mutated from one place.

use crate::channel::{self, Inbound};
use crate::config::SessionOptions;
use crate::credentials::CredentialSource;
use crate::error::SessionError;
use crate::tools::{self, ToolRegistry};
use crate::transcript::{ConversationTurn, Role, TranscriptAggregator};
use crate::transport::{ControlLink, EVENT_QUEUE_CAPACITY, EngineEvent, MediaConnector};
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Observable lifecycle state. Exactly one value at any instant; only the
/// session writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Error(String),
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Incremental updates for front-ends rendering the conversation.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// A new turn entered the transcript.
    Turn(ConversationTurn),
    /// The "remote is listening" flag changed.
    Listening(bool),
}

/// A live, bidirectional conversation session with the remote agent.
///
/// Cheap to clone; clones share the same underlying session.
#[derive(Clone)]
pub struct VoiceSession {
    inner: Arc<Inner>,
}

struct Inner {
    options: SessionOptions,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn MediaConnector>,
    tools: ToolRegistry,
    status: watch::Sender<SessionStatus>,
    notices: broadcast::Sender<SessionNotice>,
    transcript: StdMutex<TranscriptAggregator>,
    listening: AtomicBool,
    /// Bumped by every `start` and `stop`; an in-flight attempt whose epoch
    /// no longer matches has been superseded and must discard its result.
    epoch: AtomicU64,
    active: Mutex<Option<ActiveLink>>,
}

struct ActiveLink {
    link: Arc<dyn ControlLink>,
    dispatch: JoinHandle<()>,
    epoch: u64,
}

impl VoiceSession {
    pub fn new(
        options: SessionOptions,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn MediaConnector>,
        tools: ToolRegistry,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        let (notices, _) = broadcast::channel(64);
        let transcript = StdMutex::new(TranscriptAggregator::new(options.dedup_window));
        Self {
            inner: Arc::new(Inner {
                options,
                credentials,
                connector,
                tools,
                status,
                notices,
                transcript,
                listening: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    /// Starts a fresh session attempt: credential, then transport, then
    /// control-channel setup. Any failure lands in `Error` with a
    /// human-readable reason and all partial resources released. An already
    /// running session is torn down first.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.teardown().await;
        let inner = &self.inner;
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        inner.set_status(SessionStatus::Connecting);
        inner.transcript_lock().clear();
        inner.listening.store(false, Ordering::SeqCst);
        inner.tools.reset_all();

        let span = info_span!("voice_session", attempt = %Uuid::new_v4());
        match self.establish(epoch).instrument(span).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if inner.epoch.load(Ordering::SeqCst) == epoch {
                    error!(error = %err, "session start failed");
                    inner.set_status(SessionStatus::Error(err.to_string()));
                }
                Err(err)
            }
        }
    }

    async fn establish(&self, epoch: u64) -> Result<(), SessionError> {
        let inner = &self.inner;

        info!("fetching session credential");
        let credential = inner.credentials.fetch().await?;

        info!("negotiating media session");
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let link = inner.connector.connect(credential, events_tx).await?;

        let mut active = inner.active.lock().await;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            drop(active);
            info!("session was stopped during negotiation; discarding transport");
            link.close().await;
            return Ok(());
        }
        let dispatch = tokio::spawn(
            dispatch_loop(Arc::clone(inner), Arc::clone(&link), events_rx, epoch)
                .in_current_span(),
        );
        *active = Some(ActiveLink {
            link,
            dispatch,
            epoch,
        });
        Ok(())
    }

    /// Ends the session. Idempotent, never fails, callable from any state;
    /// teardown problems are logged and swallowed.
    pub async fn stop(&self) {
        self.teardown().await;
        self.inner.set_status(SessionStatus::Idle);
    }

    async fn teardown(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = inner.active.lock().await.take() {
            info!("closing session transport");
            active.dispatch.abort();
            active.link.close().await;
        }
        inner.listening.store(false, Ordering::SeqCst);
    }

    /// Sends user text into the conversation: the item, then a prompt for
    /// the model to respond. Fails gracefully when no session is active.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let link = {
            let active = self.inner.active.lock().await;
            active
                .as_ref()
                .map(|active| Arc::clone(&active.link))
                .ok_or(SessionError::NotActive)?
        };
        self.inner.append_turn(Role::User, text);
        let [item, response] = channel::user_text(text);
        link.send_event(&item).await?;
        link.send_event(&response).await?;
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// Watches status transitions; the receiver starts at the current value.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribes to transcript and speech-activity updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.inner.transcript_lock().snapshot()
    }

    /// Whether the remote side currently hears the user speaking.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn transcript_lock(&self) -> MutexGuard<'_, TranscriptAggregator> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SessionStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        })
    }

    fn set_listening(&self, listening: bool) {
        if self.listening.swap(listening, Ordering::SeqCst) != listening {
            let _ = self.notices.send(SessionNotice::Listening(listening));
        }
    }

    fn append_turn(&self, role: Role, content: &str) {
        let appended = self
            .transcript_lock()
            .append(role, content, Utc::now())
            .cloned();
        if let Some(turn) = appended {
            let _ = self.notices.send(SessionNotice::Turn(turn));
        }
    }
}

/// Consumes the transport's event queue for one session attempt.
async fn dispatch_loop(
    inner: Arc<Inner>,
    link: Arc<dyn ControlLink>,
    mut events: mpsc::Receiver<EngineEvent>,
    epoch: u64,
) {
    let mut channel_open = false;
    let mut remote_live = false;
    let mut configured = false;

    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ChannelOpen => {
                channel_open = true;
                if !configured {
                    configured = true;
                    let update =
                        channel::configure(&inner.options, inner.tools.declarations());
                    if let Err(err) = link.send_event(&update).await {
                        fail(&inner, &link, epoch, format!("configuration failed: {err}")).await;
                        break;
                    }
                    info!("control channel open; session configured");
                }
                try_mark_connected(&inner, epoch, channel_open, remote_live);
            }
            EngineEvent::RemoteMediaLive => {
                remote_live = true;
                try_mark_connected(&inner, epoch, channel_open, remote_live);
            }
            EngineEvent::ChannelMessage(raw) => match channel::classify(&raw) {
                Ok(Inbound::Transcript { role, content }) => inner.append_turn(role, &content),
                Ok(Inbound::Listening(listening)) => inner.set_listening(listening),
                Ok(Inbound::ToolCall(invocation)) => {
                    if let Err(err) = tools::dispatch(&inner.tools, link.as_ref(), invocation).await
                    {
                        fail(
                            &inner,
                            &link,
                            epoch,
                            format!("tool result could not be sent: {err}"),
                        )
                        .await;
                        break;
                    }
                }
                Ok(Inbound::Ignored) => {}
                Err(err) => warn!(error = %err, "dropping malformed control-channel message"),
            },
            EngineEvent::TransportFault(reason) => {
                fail(&inner, &link, epoch, reason).await;
                break;
            }
        }
    }
}

fn try_mark_connected(inner: &Inner, epoch: u64, channel_open: bool, remote_live: bool) {
    if channel_open
        && remote_live
        && inner.epoch.load(Ordering::SeqCst) == epoch
        && inner.set_status(SessionStatus::Connected)
    {
        info!("session connected");
    }
}

/// Fatal mid-session failure: tear the transport down and surface the reason,
/// unless a newer attempt has already superseded this one.
async fn fail(inner: &Arc<Inner>, link: &Arc<dyn ControlLink>, epoch: u64, reason: String) {
    error!(%reason, "session failed");
    link.close().await;
    if inner.epoch.load(Ordering::SeqCst) == epoch {
        let mut active = inner.active.lock().await;
        if active.as_ref().is_some_and(|a| a.epoch == epoch) {
            active.take();
        }
        drop(active);
        inner.listening.store(false, Ordering::SeqCst);
        inner.set_status(SessionStatus::Error(reason));
    }
}
