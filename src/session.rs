//! Chat session controller
//!
//! Owns the conversation state and drives one request at a time:
//! Idle -> Sending -> Streaming -> Idle, with failures reported as a chat
//! message before returning to Idle.
//!
//! Every request is tagged with the session's current attempt number. New chat
//! and close bump that number, and a stream whose attempt is no longer current
//! is dropped before it can touch the state again.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::backend::{AskBackend, AskRequest, BackendError};
use crate::context::contextual_query;
use crate::dispatch::{self, UiItem};
use crate::host::HostEnvironment;
use crate::stream::{decode_stream, StreamEvent};
use crate::transcript::Transcript;
use crate::types::config::ChatConfig;
use crate::types::message::{ArticleItem, Message, MessageId, SummaryPayload};

/// Shown in place of an answer when a request fails
pub const FAILURE_TEXT: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Request in flight, no response yet
    Sending,
    /// Consuming the response body
    Streaming,
    /// Reporting a failure; always followed by Idle
    Error,
}

/// The modal currently shown over the chat, if any
#[derive(Debug, Clone, PartialEq)]
pub enum OpenModal {
    Summary(SummaryPayload),
    Articles(Vec<ArticleItem>),
}

/// How a submission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ran to completion
    Completed,
    /// Transport failure, reported in the transcript
    Failed,
    /// Empty text or a request already in flight; nothing happened
    Ignored,
    /// A new chat or close happened while the request was in flight
    Superseded,
}

/// Visible conversation state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub transcript: Transcript,
    /// The message currently receiving tokens
    pub active_stream_target: Option<MessageId>,
    pub is_awaiting_response: bool,
    /// Draft text not yet sent
    pub composed_input: String,
    pub open_modal: Option<OpenModal>,
    pub phase: SessionPhase,
    pub is_open: bool,
    attempt: u64,
}

impl SessionState {
    fn new(config: &ChatConfig) -> Self {
        let mut transcript = Transcript::new();
        transcript.replace_all(seed(config));
        Self {
            transcript,
            active_stream_target: None,
            is_awaiting_response: false,
            composed_input: String::new(),
            open_modal: None,
            phase: SessionPhase::Idle,
            is_open: false,
            attempt: 0,
        }
    }

    pub fn has_user_sent(&self) -> bool {
        self.transcript.iter().any(|m| m.is_user())
    }

    /// Number of entries that are not onboarding affordances
    pub fn visible_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|m| !m.kind.is_onboarding())
            .count()
    }

    /// Whether the panel should expand to fit the conversation
    pub fn can_grow(&self) -> bool {
        self.has_user_sent() && self.visible_count() > 1
    }

    /// Waiting on the backend with nothing streamed yet
    pub fn typing_indicator(&self) -> bool {
        if !self.is_awaiting_response {
            return false;
        }
        match self.active_stream_target {
            Some(id) => self
                .transcript
                .get(id)
                .map_or(true, |m| m.text.trim().is_empty()),
            None => true,
        }
    }

    fn transition(&mut self, to: SessionPhase) {
        tracing::debug!(attempt = self.attempt, from = ?self.phase, to = ?to, "Session transition");
        self.phase = to;
    }

    /// Stop caring about whatever request is in flight
    fn abandon_request(&mut self) {
        self.attempt += 1;
        self.active_stream_target = None;
        self.is_awaiting_response = false;
        self.transition(SessionPhase::Idle);
    }
}

/// Onboarding entries shown before the first user message
fn seed(config: &ChatConfig) -> Vec<Message> {
    vec![
        Message::welcome(config.welcome_text.clone()),
        Message::quick_actions(),
    ]
}

/// Resolves once the session has moved past `attempt`
async fn superseded(attempts: &mut watch::Receiver<u64>, attempt: u64) {
    if attempts.wait_for(|current| *current != attempt).await.is_err() {
        std::future::pending::<()>().await;
    }
}

struct Inner<B, H> {
    backend: B,
    host: H,
    config: ChatConfig,
    state: Mutex<SessionState>,
    revision: watch::Sender<u64>,
    /// Mirrors `SessionState.attempt` so in-flight requests can wait on it
    attempts: watch::Sender<u64>,
}

/// Handle to a chat session. Clones share the same session.
pub struct ChatSession<B, H> {
    inner: Arc<Inner<B, H>>,
}

impl<B, H> Clone for ChatSession<B, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B, H> ChatSession<B, H>
where
    B: AskBackend,
    H: HostEnvironment,
{
    pub fn new(backend: B, host: H, config: ChatConfig) -> Self {
        let (revision, _) = watch::channel(0);
        let (attempts, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                backend,
                host,
                state: Mutex::new(SessionState::new(&config)),
                config,
                revision,
                attempts,
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    pub fn quick_actions(&self) -> &[String] {
        &self.inner.config.quick_actions
    }

    /// Copy of the current state for rendering
    pub async fn snapshot(&self) -> SessionState {
        self.inner.state.lock().await.clone()
    }

    /// Revision counter bumped on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn notify(&self) {
        self.inner.revision.send_modify(|revision| *revision += 1);
    }

    async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().await
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        self.lock().await.composed_input = text.into();
        self.notify();
    }

    /// Send the current draft
    pub async fn submit_draft(&self) -> SendOutcome {
        let draft = self.lock().await.composed_input.clone();
        self.send(&draft).await
    }

    /// Quick-action shortcut: put the label in the draft and send it.
    /// The draft is left empty either way.
    pub async fn choose_quick_action(&self, label: &str) -> SendOutcome {
        self.set_draft(label).await;
        let outcome = self.submit_draft().await;
        if outcome == SendOutcome::Ignored {
            self.set_draft("").await;
        }
        outcome
    }

    /// Submit user text and consume the streamed answer.
    ///
    /// Ignored when the text is blank or a request is already in flight.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let attempt = {
            let mut state = self.lock().await;
            if text.trim().is_empty()
                || state.phase != SessionPhase::Idle
                || state.is_awaiting_response
            {
                return SendOutcome::Ignored;
            }

            state.transcript.remove_where(|m| m.kind.is_onboarding());
            state.transcript.append(Message::user(text));
            state.composed_input.clear();
            state.is_awaiting_response = true;
            state.transition(SessionPhase::Sending);
            state.attempt
        };
        self.notify();

        let mut attempts = self.inner.attempts.subscribe();
        let host = &self.inner.host;
        let request = AskRequest {
            query: contextual_query(text, host),
            page_url: host.current_url(),
        };
        tracing::info!(attempt, page_url = %request.page_url, "Submitting query");

        let response = tokio::select! {
            response = self.inner.backend.ask_stream(request) => response,
            _ = superseded(&mut attempts, attempt) => {
                tracing::debug!(attempt, "Request superseded before the response arrived");
                return SendOutcome::Superseded;
            }
        };
        let chunks = match response {
            Ok(chunks) => chunks,
            Err(e) => return self.fail(attempt, &e).await,
        };

        let target = {
            let mut state = self.lock().await;
            if state.attempt != attempt {
                tracing::debug!(attempt, "Response arrived for a superseded request");
                return SendOutcome::Superseded;
            }
            let id = state.transcript.append(Message::assistant(""));
            state.active_stream_target = Some(id);
            state.transition(SessionPhase::Streaming);
            id
        };
        self.notify();

        let mut events = std::pin::pin!(decode_stream(chunks));
        loop {
            let event = tokio::select! {
                event = events.next() => event,
                _ = superseded(&mut attempts, attempt) => {
                    tracing::debug!(attempt, "Dropping a superseded stream");
                    return SendOutcome::Superseded;
                }
            };
            let Some(event) = event else {
                break;
            };
            {
                let mut state = self.lock().await;
                if state.attempt != attempt {
                    tracing::debug!(attempt, "Dropping events of a superseded stream");
                    return SendOutcome::Superseded;
                }
                match event {
                    Ok(StreamEvent::Token(fragment)) => {
                        state
                            .transcript
                            .update_by_id(target, |m| m.text.push_str(&fragment));
                    }
                    Ok(StreamEvent::UiItems(payload)) => {
                        let item = UiItem::from_payload(&payload);
                        dispatch::handle(&item.item_type, &item.data, host, &mut state.transcript);
                    }
                    Err(e) => {
                        drop(state);
                        return self.fail(attempt, &e).await;
                    }
                }
            }
            self.notify();
        }

        {
            let mut state = self.lock().await;
            if state.attempt != attempt {
                return SendOutcome::Superseded;
            }
            state.active_stream_target = None;
            state.is_awaiting_response = false;
            state.transition(SessionPhase::Idle);
        }
        self.notify();
        tracing::info!(attempt, "Stream completed");
        SendOutcome::Completed
    }

    async fn fail(&self, attempt: u64, error: &BackendError) -> SendOutcome {
        {
            let mut state = self.lock().await;
            if state.attempt != attempt {
                return SendOutcome::Superseded;
            }
            tracing::error!(attempt, "Error sending message: {}", error);
            state.transition(SessionPhase::Error);
            state.active_stream_target = None;
            state.transcript.append(Message::assistant(FAILURE_TEXT));
            state.is_awaiting_response = false;
            state.transition(SessionPhase::Idle);
        }
        self.notify();
        SendOutcome::Failed
    }

    /// Start over: back to the seed transcript, dropping any in-flight stream
    pub async fn new_chat(&self) {
        {
            let mut state = self.lock().await;
            state.abandon_request();
            self.inner.attempts.send_replace(state.attempt);
            state.transcript.replace_all(seed(&self.inner.config));
            state.composed_input.clear();
            state.open_modal = None;
            tracing::info!(attempt = state.attempt, "Started new chat");
        }
        self.notify();
    }

    pub async fn open(&self) {
        self.lock().await.is_open = true;
        self.notify();
    }

    /// Hide the widget. The transcript is kept; an in-flight stream is dropped.
    pub async fn close(&self) {
        {
            let mut state = self.lock().await;
            if state.is_awaiting_response {
                tracing::debug!(attempt = state.attempt, "Closing with a request in flight");
            }
            state.abandon_request();
            self.inner.attempts.send_replace(state.attempt);
            state.open_modal = None;
            state.is_open = false;
        }
        self.notify();
    }

    /// Open the summary modal for a summary card. False if `id` is not one.
    pub async fn open_summary(&self, id: MessageId) -> bool {
        let opened = {
            let mut state = self.lock().await;
            let payload = state
                .transcript
                .get(id)
                .and_then(|m| m.summary_payload())
                .cloned();
            match payload {
                Some(payload) => {
                    state.open_modal = Some(OpenModal::Summary(payload));
                    true
                }
                None => false,
            }
        };
        if opened {
            self.notify();
        }
        opened
    }

    /// Open the articles modal for an articles card. False if `id` is not one.
    pub async fn open_articles(&self, id: MessageId) -> bool {
        let opened = {
            let mut state = self.lock().await;
            let items = state
                .transcript
                .get(id)
                .and_then(|m| m.articles_payload())
                .map(|items| items.to_vec());
            match items {
                Some(items) => {
                    state.open_modal = Some(OpenModal::Articles(items));
                    true
                }
                None => false,
            }
        };
        if opened {
            self.notify();
        }
        opened
    }

    pub async fn close_modal(&self) {
        self.lock().await.open_modal = None;
        self.notify();
    }
}
