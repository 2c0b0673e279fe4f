//! Turn lifecycle for a single conversation.
//!
//! A [`TurnCoordinator`] is the only writer of its [`Conversation`]. It hands
//! out [`StreamJob`]s for background workers and later applies their results,
//! so the message log is mutated exclusively on the event loop.
//!
//! ```text
//! Idle --send/retry--> Sending --complete | error | cancel--> Idle
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::conversation::{Conversation, ConversationId};
use crate::core::error::{StreamError, TurnError};
use crate::core::message::Role;
use crate::core::requestor::{StreamOutcome, StreamRequest};

pub type TurnId = u64;

/// Synthetic prompt used for title generation; never stored in the log.
pub const TITLE_PROMPT: &str = "Summarize this conversation as a short title of at most six words. \
Reply with the title only, without quotes or trailing punctuation.";

const MAX_TITLE_CHARS: usize = 60;

/// Connection parameters shared by every request of a session.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub endpoint: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Reply,
    Title,
}

/// Work order for a background stream worker.
#[derive(Debug, Clone)]
pub struct StreamJob {
    pub conversation_id: ConversationId,
    pub turn_id: TurnId,
    pub kind: TurnKind,
    pub request: StreamRequest,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sending,
}

/// What applying a worker result did to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResolution {
    /// Assistant reply appended with this sequence number.
    Replied { sequence: u64 },
    /// The request failed; the user message stays in place for a retry.
    Failed(TurnError),
    /// The turn was cancelled and its user message rolled back.
    Cancelled,
    /// A title was generated and stored.
    Titled(String),
    /// Title generation failed or produced nothing; the log is untouched.
    TitleFailed(TurnError),
    /// Result for a turn that is no longer pending (already cancelled or
    /// superseded); ignored.
    Stale,
}

#[derive(Debug)]
struct PendingTurn {
    turn_id: TurnId,
    user_sequence: u64,
    cancel: CancellationToken,
    partial: String,
}

#[derive(Debug)]
struct PendingTitle {
    turn_id: TurnId,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct TurnCoordinator {
    conversation: Conversation,
    pending: Option<PendingTurn>,
    title: Option<PendingTitle>,
    next_turn_id: TurnId,
}

impl TurnCoordinator {
    pub fn new(mut conversation: Conversation) -> Self {
        conversation.set_in_flight(false);
        Self {
            conversation,
            pending: None,
            title: None,
            next_turn_id: 1,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.conversation.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> TurnPhase {
        if self.pending.is_some() {
            TurnPhase::Sending
        } else {
            TurnPhase::Idle
        }
    }

    pub fn is_sending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_titling(&self) -> bool {
        self.title.is_some()
    }

    /// Deltas received so far for the in-flight reply.
    pub fn partial_reply(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.partial.as_str())
    }

    /// True when the last message is a user turn without a reply, which is
    /// what a failed request leaves behind.
    pub fn can_retry(&self) -> bool {
        self.pending.is_none() && self.conversation.last().is_some_and(|m| m.is_user())
    }

    pub fn send(&mut self, text: &str, settings: &RequestSettings) -> Result<StreamJob, TurnError> {
        if self.pending.is_some() {
            debug!(conversation = %self.conversation.id, "Rejecting send while a reply is in flight");
            return Err(TurnError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let user_sequence = self.conversation.append(Role::User, text);
        Ok(self.start_reply(user_sequence, settings))
    }

    /// Re-issues the request for an unanswered trailing user message.
    pub fn retry(&mut self, settings: &RequestSettings) -> Result<StreamJob, TurnError> {
        if self.pending.is_some() {
            return Err(TurnError::Busy);
        }
        let user_sequence = match self.conversation.last() {
            Some(message) if message.is_user() => message.sequence,
            _ => return Err(TurnError::NothingToRetry),
        };
        Ok(self.start_reply(user_sequence, settings))
    }

    fn start_reply(&mut self, user_sequence: u64, settings: &RequestSettings) -> StreamJob {
        let turn_id = self.allocate_turn_id();
        let cancel = CancellationToken::new();
        let request = self.build_request(settings, None);

        self.pending = Some(PendingTurn {
            turn_id,
            user_sequence,
            cancel: cancel.clone(),
            partial: String::new(),
        });
        self.conversation.set_in_flight(true);
        info!(conversation = %self.conversation.id, turn_id, "Turn started");

        StreamJob {
            conversation_id: self.conversation.id.clone(),
            turn_id,
            kind: TurnKind::Reply,
            request,
            cancel,
        }
    }

    /// Cancels the in-flight reply, rolling back its user message.
    ///
    /// Returns `false` when there was nothing to cancel, which makes repeated
    /// calls harmless.
    pub fn cancel(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };

        pending.cancel.cancel();
        self.conversation.remove_sequence(pending.user_sequence);
        self.conversation.set_in_flight(false);
        info!(
            conversation = %self.conversation.id,
            turn_id = pending.turn_id,
            discarded = pending.partial.len(),
            "Turn cancelled"
        );
        true
    }

    /// Cancels both the reply and any title request; used when the session
    /// is torn down.
    pub fn shutdown(&mut self) {
        self.cancel();
        if let Some(title) = self.title.take() {
            title.cancel.cancel();
        }
    }

    /// Starts title generation from a snapshot of the log plus a synthetic
    /// prompt. Refuses to run alongside a reply or another title request.
    pub fn request_title(&mut self, settings: &RequestSettings) -> Result<StreamJob, TurnError> {
        if self.pending.is_some() || self.title.is_some() {
            return Err(TurnError::Busy);
        }
        if !self.conversation.messages().iter().any(|m| m.is_user()) {
            return Err(TurnError::EmptyConversation);
        }

        let turn_id = self.allocate_turn_id();
        let cancel = CancellationToken::new();
        let request = self.build_request(settings, Some(TITLE_PROMPT));
        self.title = Some(PendingTitle {
            turn_id,
            cancel: cancel.clone(),
        });
        debug!(conversation = %self.conversation.id, turn_id, "Title generation started");

        Ok(StreamJob {
            conversation_id: self.conversation.id.clone(),
            turn_id,
            kind: TurnKind::Title,
            request,
            cancel,
        })
    }

    /// Records a live delta for display. Deltas for stale turns are dropped.
    pub fn push_delta(&mut self, turn_id: TurnId, delta: &str) {
        if let Some(pending) = self.pending.as_mut().filter(|p| p.turn_id == turn_id) {
            pending.partial.push_str(delta);
        }
    }

    /// Applies a worker result. Must be called on the event loop.
    pub fn resolve(
        &mut self,
        turn_id: TurnId,
        kind: TurnKind,
        result: Result<StreamOutcome, StreamError>,
    ) -> TurnResolution {
        match kind {
            TurnKind::Reply => self.resolve_reply(turn_id, result),
            TurnKind::Title => self.resolve_title(turn_id, result),
        }
    }

    fn resolve_reply(
        &mut self,
        turn_id: TurnId,
        result: Result<StreamOutcome, StreamError>,
    ) -> TurnResolution {
        if self.pending.as_ref().map(|p| p.turn_id) != Some(turn_id) {
            debug!(conversation = %self.conversation.id, turn_id, "Ignoring result for stale turn");
            return TurnResolution::Stale;
        }

        match result {
            Ok(StreamOutcome::Completed(content)) => {
                let pending = self.pending.take();
                self.conversation.set_in_flight(false);
                if content.trim().is_empty() {
                    warn!(conversation = %self.conversation.id, turn_id, "Empty reply received");
                    return TurnResolution::Failed(TurnError::EmptyReply);
                }
                let sequence = self.conversation.append(Role::Assistant, content);
                info!(
                    conversation = %self.conversation.id,
                    turn_id,
                    streamed = pending.map(|p| p.partial.len()).unwrap_or_default(),
                    "Turn completed"
                );
                TurnResolution::Replied { sequence }
            }
            Ok(StreamOutcome::Cancelled { .. }) => {
                self.cancel();
                TurnResolution::Cancelled
            }
            Err(err) => {
                self.pending = None;
                self.conversation.set_in_flight(false);
                warn!(conversation = %self.conversation.id, turn_id, error = %err, "Turn failed");
                TurnResolution::Failed(TurnError::Stream(err))
            }
        }
    }

    fn resolve_title(
        &mut self,
        turn_id: TurnId,
        result: Result<StreamOutcome, StreamError>,
    ) -> TurnResolution {
        if self.title.as_ref().map(|t| t.turn_id) != Some(turn_id) {
            return TurnResolution::Stale;
        }
        self.title = None;

        match result {
            Ok(StreamOutcome::Completed(raw)) => match clean_title(&raw) {
                Some(title) => {
                    self.conversation.title = Some(title.clone());
                    info!(conversation = %self.conversation.id, %title, "Title generated");
                    TurnResolution::Titled(title)
                }
                None => TurnResolution::TitleFailed(TurnError::EmptyReply),
            },
            Ok(StreamOutcome::Cancelled { .. }) => TurnResolution::Stale,
            Err(err) => TurnResolution::TitleFailed(TurnError::Stream(err)),
        }
    }

    fn build_request(&self, settings: &RequestSettings, extra_prompt: Option<&str>) -> StreamRequest {
        let mut messages = self.conversation.api_messages();
        if let Some(prompt) = extra_prompt {
            messages.push(crate::api::ChatMessage {
                role: Role::User.as_str().to_string(),
                content: prompt.to_string(),
            });
        }

        StreamRequest {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: self.conversation.model.clone(),
            messages,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout,
        }
    }

    fn allocate_turn_id(&mut self) -> TurnId {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        id
    }
}

fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '#')
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(MAX_TITLE_CHARS).collect())
}
