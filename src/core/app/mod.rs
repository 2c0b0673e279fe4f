//! Application state owned by the event loop.
//!
//! `App` holds every conversation's [`TurnCoordinator`](crate::core::turn::TurnCoordinator)
//! and the [`NavigationStack`]. Views ask for changes through
//! [`ViewCommand`]s; workers report through [`AppAction`]s. Both are applied
//! here, on the loop task, so no conversation state is shared across threads.

use std::collections::{HashMap, VecDeque};

use ratatui::crossterm::event::KeyEvent;
use ratatui::Frame;
use tracing::{debug, info, warn};

use crate::core::conversation::{Conversation, ConversationId};
use crate::core::error::TurnError;
use crate::core::session::SessionRegistry;
use crate::core::store::{ConversationStore, StoreError};
use crate::core::turn::{RequestSettings, StreamJob};
use crate::ui::navigation::{NavigationStack, TurnEvent, ViewCommand, ViewContext, ViewEvent, ViewId};
use crate::ui::views::{ChatView, MenuView, ModalView};

pub mod actions;

pub use actions::{apply_action, apply_actions, AppAction, AppActionDispatcher, AppCommand};

/// Everything needed to build an [`App`].
pub struct AppSetup {
    pub settings: RequestSettings,
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub store: Box<dyn ConversationStore>,
    pub auto_title: bool,
}

pub struct App {
    pub sessions: SessionRegistry,
    pub nav: NavigationStack,
    settings: RequestSettings,
    default_model: String,
    system_prompt: Option<String>,
    store: Box<dyn ConversationStore>,
    auto_title: bool,
    /// The view each conversation's latest turn was started from.
    origins: HashMap<ConversationId, ViewId>,
    tick: u64,
    pub exit_requested: bool,
}

impl App {
    pub fn new(setup: AppSetup) -> Self {
        let (conversations, load_error) = match setup.store.list() {
            Ok(conversations) => (conversations, None),
            Err(err) => {
                warn!(error = %err, "Could not load saved conversations");
                (Vec::new(), Some(err))
            }
        };
        info!(count = conversations.len(), "Loaded conversations");

        let mut app = Self {
            sessions: SessionRegistry::from_conversations(conversations),
            nav: NavigationStack::new(Box::new(MenuView::new())),
            settings: setup.settings,
            default_model: setup.default_model,
            system_prompt: setup.system_prompt,
            store: setup.store,
            auto_title: setup.auto_title,
            origins: HashMap::new(),
            tick: 0,
            exit_requested: false,
        };

        if let Some(err) = load_error {
            app.nav.push(Box::new(ModalView::error(format!(
                "Saved conversations could not be loaded:\n{err}"
            ))));
        }
        app
    }

    pub fn has_active_turns(&self) -> bool {
        self.sessions.sending_count() > 0
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<AppCommand> {
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        let commands = self.nav.dispatch_key(key, &ctx);
        self.apply_view_commands(commands)
    }

    pub fn handle_paste(&mut self, text: String) -> Vec<AppCommand> {
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        let commands = self.nav.dispatch_event(&ViewEvent::Paste(text), &ctx);
        self.apply_view_commands(commands)
    }

    pub fn tick(&mut self) -> Vec<AppCommand> {
        self.tick = self.tick.wrapping_add(1);
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        let commands = self.nav.dispatch_event(&ViewEvent::Tick, &ctx);
        self.apply_view_commands(commands)
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        self.nav.render(frame, &ctx);
    }

    /// Cancels everything in flight and saves the rolled-back conversations.
    pub fn shutdown(&mut self) {
        let interrupted: Vec<ConversationId> = self
            .sessions
            .ordered()
            .into_iter()
            .filter(|c| c.is_sending())
            .map(|c| c.id().clone())
            .collect();
        self.sessions.shutdown_all();
        for id in &interrupted {
            self.persist(id);
        }
        info!(interrupted = interrupted.len(), "App shut down");
    }

    pub fn apply_view_commands(&mut self, commands: Vec<ViewCommand>) -> Vec<AppCommand> {
        let mut queue: VecDeque<ViewCommand> = commands.into();
        let mut out = Vec::new();

        while let Some(command) = queue.pop_front() {
            match command {
                ViewCommand::Push(view) => {
                    self.nav.push(view);
                }
                ViewCommand::Pop => {
                    if let Some(view) = self.nav.pop() {
                        if let Some(id) = view.conversation_id() {
                            self.discard_if_blank(id);
                        }
                    }
                }
                ViewCommand::ReplaceTop(view) => {
                    self.nav.replace_top(view);
                }
                ViewCommand::Exit => {
                    info!("Exit requested");
                    self.exit_requested = true;
                }
                ViewCommand::NewConversation => {
                    let conversation = Conversation::with_system_prompt(
                        self.default_model.clone(),
                        self.system_prompt.as_deref(),
                    );
                    let id = conversation.id.clone();
                    debug!(conversation = %id, "New conversation");
                    self.sessions.insert(conversation);
                    self.nav.push(Box::new(ChatView::new(id)));
                }
                ViewCommand::OpenConversation(id) => {
                    if self.sessions.contains(&id) {
                        self.nav.push(Box::new(ChatView::new(id)));
                    } else {
                        warn!(conversation = %id, "Cannot open unknown conversation");
                    }
                }
                ViewCommand::DeleteConversation(id) => self.delete_conversation(&id),
                ViewCommand::SendMessage {
                    conversation_id,
                    text,
                } => {
                    let started = self
                        .sessions
                        .get_mut(&conversation_id)
                        .map(|c| c.send(&text, &self.settings));
                    queue.extend(self.start_turn(&conversation_id, started, &mut out));
                }
                ViewCommand::RetryTurn(conversation_id) => {
                    let started = self
                        .sessions
                        .get_mut(&conversation_id)
                        .map(|c| c.retry(&self.settings));
                    queue.extend(self.start_turn(&conversation_id, started, &mut out));
                }
                ViewCommand::CancelTurn(conversation_id) => {
                    let cancelled = self
                        .sessions
                        .get_mut(&conversation_id)
                        .is_some_and(|c| c.cancel());
                    if cancelled {
                        self.persist(&conversation_id);
                        queue.extend(self.notify_view(&conversation_id, TurnEvent::Cancelled));
                    }
                }
                ViewCommand::GenerateTitle(conversation_id) => {
                    let requested = self
                        .sessions
                        .get_mut(&conversation_id)
                        .map(|c| c.request_title(&self.settings));
                    match requested {
                        Some(Ok(job)) => {
                            self.origins.insert(conversation_id, self.nav.active_id());
                            out.push(AppCommand::SpawnStream(job));
                        }
                        Some(Err(err)) => queue.extend(self.notice(err.to_string())),
                        None => {}
                    }
                }
            }
        }
        out
    }

    fn start_turn(
        &mut self,
        conversation_id: &ConversationId,
        started: Option<Result<StreamJob, TurnError>>,
        out: &mut Vec<AppCommand>,
    ) -> Vec<ViewCommand> {
        match started {
            Some(Ok(job)) => {
                self.origins
                    .insert(conversation_id.clone(), self.nav.active_id());
                self.persist(conversation_id);
                out.push(AppCommand::SpawnStream(job));
                self.notify_view(conversation_id, TurnEvent::Started)
            }
            Some(Err(TurnError::EmptyMessage)) => Vec::new(),
            Some(Err(err)) => self.notice(err.to_string()),
            None => {
                warn!(conversation = %conversation_id, "Turn requested for unknown conversation");
                Vec::new()
            }
        }
    }

    fn notice(&mut self, message: String) -> Vec<ViewCommand> {
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        self.nav.dispatch_event(&ViewEvent::Notice(message), &ctx)
    }

    /// Delivers a turn event to the view that started the turn, if that view
    /// is still the active one.
    fn notify_view(&mut self, conversation_id: &ConversationId, event: TurnEvent) -> Vec<ViewCommand> {
        let Some(&origin) = self.origins.get(conversation_id) else {
            return Vec::new();
        };
        let ctx = ViewContext {
            sessions: &self.sessions,
            tick: self.tick,
        };
        let event = ViewEvent::Turn {
            conversation_id: conversation_id.clone(),
            event,
        };
        self.nav.deliver_to(origin, &event, &ctx).unwrap_or_default()
    }

    pub(crate) fn notify_origin(
        &mut self,
        conversation_id: &ConversationId,
        event: TurnEvent,
    ) -> Vec<AppCommand> {
        let commands = self.notify_view(conversation_id, event);
        self.apply_view_commands(commands)
    }

    pub(crate) fn maybe_auto_title(&mut self, conversation_id: &ConversationId) -> Vec<AppCommand> {
        if !self.auto_title {
            return Vec::new();
        }
        let Some(coordinator) = self.sessions.get_mut(conversation_id) else {
            return Vec::new();
        };
        let conversation = coordinator.conversation();
        let replies = conversation.messages().iter().filter(|m| m.is_assistant()).count();
        if conversation.title.is_some() || replies != 1 {
            return Vec::new();
        }
        match coordinator.request_title(&self.settings) {
            Ok(job) => vec![AppCommand::SpawnStream(job)],
            Err(err) => {
                debug!(conversation = %conversation_id, error = %err, "Skipping automatic title");
                Vec::new()
            }
        }
    }

    /// Writes the conversation through the store. A conversation that has
    /// lost all of its user messages is removed from storage instead.
    pub(crate) fn persist(&mut self, conversation_id: &ConversationId) {
        let Some(coordinator) = self.sessions.get(conversation_id) else {
            return;
        };
        let conversation = coordinator.conversation();
        let result = if conversation.messages().iter().any(|m| m.is_user()) {
            self.store.save(conversation)
        } else {
            match self.store.delete(conversation_id) {
                Err(StoreError::NotFound(_)) => Ok(()),
                other => other,
            }
        };

        if let Err(err) = result {
            warn!(conversation = %conversation_id, error = %err, "Could not save conversation");
            let commands = self.notice(format!("Could not save conversation: {err}"));
            self.apply_view_commands(commands);
        }
    }

    fn delete_conversation(&mut self, id: &ConversationId) {
        self.sessions.remove(id);
        self.origins.remove(id);
        match self.store.delete(id) {
            Ok(()) | Err(StoreError::NotFound(_)) => info!(conversation = %id, "Conversation deleted"),
            Err(err) => {
                warn!(conversation = %id, error = %err, "Could not delete conversation");
                self.nav
                    .push(Box::new(ModalView::error(format!("Could not delete conversation:\n{err}"))));
            }
        }
    }

    /// Drops a conversation the user opened but never wrote in.
    fn discard_if_blank(&mut self, id: &ConversationId) {
        let blank = self
            .sessions
            .get(id)
            .is_some_and(|c| !c.is_sending() && !c.conversation().messages().iter().any(|m| m.is_user()));
        if blank {
            debug!(conversation = %id, "Discarding blank conversation");
            self.sessions.remove(id);
            self.origins.remove(id);
        }
    }
}

#[cfg(test)]
mod tests;
