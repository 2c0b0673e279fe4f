//! View stack and key dispatch.
//!
//! Only the top of the [`NavigationStack`] receives input. Views never touch
//! conversation state directly: they return [`ViewCommand`]s which the app
//! applies, and learn about finished turns through [`ViewEvent`]s.

use std::fmt;

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::Rect;
use ratatui::Frame;
use tracing::debug;

use crate::core::conversation::ConversationId;
use crate::core::error::TurnError;
use crate::core::session::SessionRegistry;

pub type ViewId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Menu,
    Chat,
    Modal,
}

/// Pattern for matching key events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyPattern {
    pub fn simple(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::CONTROL,
        }
    }

    pub fn with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        self.code == key.code && self.modifiers == key.modifiers
    }

    /// Short human-readable form used in help text, e.g. `Ctrl+R`.
    pub fn describe(&self) -> String {
        let key = match self.code {
            KeyCode::Char(' ') => "Space".to_string(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Up => "↑".to_string(),
            KeyCode::Down => "↓".to_string(),
            KeyCode::PageUp => "PgUp".to_string(),
            KeyCode::PageDown => "PgDn".to_string(),
            KeyCode::Delete => "Del".to_string(),
            KeyCode::F(n) => format!("F{n}"),
            other => format!("{other:?}"),
        };
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            format!("Ctrl+{}", key.to_uppercase())
        } else if self.modifiers.contains(KeyModifiers::ALT) {
            format!("Alt+{key}")
        } else {
            key
        }
    }
}

impl From<&KeyEvent> for KeyPattern {
    fn from(key: &KeyEvent) -> Self {
        Self {
            code: key.code,
            modifiers: key.modifiers,
        }
    }
}

/// Semantic actions a view's control bindings map keys onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    MoveUp,
    MoveDown,
    Select,
    NewChat,
    DeleteChat,
    Quit,
    Back,
    Send,
    Cancel,
    Retry,
    GenerateTitle,
    ScrollUp,
    ScrollDown,
    Help,
    Confirm,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct ControlBinding {
    pub pattern: KeyPattern,
    pub action: ViewAction,
    pub label: &'static str,
}

impl ControlBinding {
    pub fn new(pattern: KeyPattern, action: ViewAction, label: &'static str) -> Self {
        Self {
            pattern,
            action,
            label,
        }
    }
}

/// Requests a view makes of the navigation stack or of the app.
pub enum ViewCommand {
    Push(Box<dyn View>),
    Pop,
    ReplaceTop(Box<dyn View>),
    Exit,
    NewConversation,
    OpenConversation(ConversationId),
    DeleteConversation(ConversationId),
    SendMessage {
        conversation_id: ConversationId,
        text: String,
    },
    CancelTurn(ConversationId),
    RetryTurn(ConversationId),
    GenerateTitle(ConversationId),
}

impl fmt::Debug for ViewCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewCommand::Push(view) => write!(f, "Push({:?})", view.kind()),
            ViewCommand::Pop => f.write_str("Pop"),
            ViewCommand::ReplaceTop(view) => write!(f, "ReplaceTop({:?})", view.kind()),
            ViewCommand::Exit => f.write_str("Exit"),
            ViewCommand::NewConversation => f.write_str("NewConversation"),
            ViewCommand::OpenConversation(id) => write!(f, "OpenConversation({id})"),
            ViewCommand::DeleteConversation(id) => write!(f, "DeleteConversation({id})"),
            ViewCommand::SendMessage {
                conversation_id,
                text,
            } => write!(f, "SendMessage({conversation_id}, {text:?})"),
            ViewCommand::CancelTurn(id) => write!(f, "CancelTurn({id})"),
            ViewCommand::RetryTurn(id) => write!(f, "RetryTurn({id})"),
            ViewCommand::GenerateTitle(id) => write!(f, "GenerateTitle({id})"),
        }
    }
}

/// What happened to a turn, as far as a view needs to know.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Started,
    Delta,
    Replied,
    Failed(TurnError),
    Cancelled,
    Titled(String),
    TitleFailed(TurnError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Tick,
    Turn {
        conversation_id: ConversationId,
        event: TurnEvent,
    },
    Notice(String),
    Paste(String),
}

/// Read-only state views render from.
pub struct ViewContext<'a> {
    pub sessions: &'a SessionRegistry,
    pub tick: u64,
}

pub trait View {
    fn kind(&self) -> ViewKind;

    fn title(&self, ctx: &ViewContext) -> String;

    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &ViewContext);

    /// Scanned in order on every key press; the first match wins.
    fn control_bindings(&self) -> Vec<ControlBinding>;

    fn handle_action(&mut self, action: ViewAction, ctx: &ViewContext) -> Vec<ViewCommand>;

    /// Keys that matched no binding.
    fn handle_input(&mut self, _key: KeyEvent, _ctx: &ViewContext) -> Vec<ViewCommand> {
        Vec::new()
    }

    fn handle_event(&mut self, _event: &ViewEvent, _ctx: &ViewContext) -> Vec<ViewCommand> {
        Vec::new()
    }

    fn on_suspend(&mut self) {}

    fn on_resume(&mut self) {}

    /// The conversation this view is showing, if any.
    fn conversation_id(&self) -> Option<&ConversationId> {
        None
    }
}

struct StackEntry {
    id: ViewId,
    view: Box<dyn View>,
}

/// Ordered views; the last is active and the root is never popped.
pub struct NavigationStack {
    entries: Vec<StackEntry>,
    next_id: ViewId,
}

impl NavigationStack {
    pub fn new(root: Box<dyn View>) -> Self {
        Self {
            entries: vec![StackEntry { id: 1, view: root }],
            next_id: 2,
        }
    }

    fn allocate_id(&mut self) -> ViewId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn top(&self) -> &StackEntry {
        // The root is never removed, so the stack is never empty.
        &self.entries[self.entries.len() - 1]
    }

    fn top_mut(&mut self) -> &mut StackEntry {
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn push(&mut self, view: Box<dyn View>) -> ViewId {
        self.top_mut().view.on_suspend();
        let id = self.allocate_id();
        debug!(view_id = id, kind = ?view.kind(), depth = self.entries.len() + 1, "Pushing view");
        self.entries.push(StackEntry { id, view });
        id
    }

    /// Removes the active view. At the root this does nothing and returns
    /// `None`.
    pub fn pop(&mut self) -> Option<Box<dyn View>> {
        if self.entries.len() <= 1 {
            debug!("Ignoring pop at the root view");
            return None;
        }
        let entry = self.entries.pop()?;
        debug!(view_id = entry.id, kind = ?entry.view.kind(), "Popped view");
        self.top_mut().view.on_resume();
        Some(entry.view)
    }

    /// Swaps the active view for `view` without resuming the one beneath.
    pub fn replace_top(&mut self, view: Box<dyn View>) -> ViewId {
        let id = self.allocate_id();
        debug!(view_id = id, kind = ?view.kind(), "Replacing top view");
        *self.top_mut() = StackEntry { id, view };
        id
    }

    pub fn active_id(&self) -> ViewId {
        self.top().id
    }

    pub fn active_kind(&self) -> ViewKind {
        self.top().view.kind()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Routes a key press to the active view.
    pub fn dispatch_key(&mut self, key: KeyEvent, ctx: &ViewContext) -> Vec<ViewCommand> {
        let view = &mut self.top_mut().view;
        let action = view
            .control_bindings()
            .into_iter()
            .find(|binding| binding.pattern.matches(&key))
            .map(|binding| binding.action);

        match action {
            Some(action) => view.handle_action(action, ctx),
            None => view.handle_input(key, ctx),
        }
    }

    /// Routes a tick, notice, or paste to the active view.
    pub fn dispatch_event(&mut self, event: &ViewEvent, ctx: &ViewContext) -> Vec<ViewCommand> {
        self.top_mut().view.handle_event(event, ctx)
    }

    /// Delivers a turn event to `origin` only if it is still the active
    /// view. Returns `None` when the event was not delivered.
    pub fn deliver_to(
        &mut self,
        origin: ViewId,
        event: &ViewEvent,
        ctx: &ViewContext,
    ) -> Option<Vec<ViewCommand>> {
        if self.active_id() != origin {
            debug!(origin, active = self.active_id(), "Origin view inactive; event not delivered");
            return None;
        }
        Some(self.dispatch_event(event, ctx))
    }

    /// Draws the topmost full-screen view, then any modals stacked on it.
    pub fn render(&mut self, frame: &mut Frame, ctx: &ViewContext) {
        let area = frame.area();
        let base = self
            .entries
            .iter()
            .rposition(|entry| entry.view.kind() != ViewKind::Modal)
            .unwrap_or(0);
        for entry in &mut self.entries[base..] {
            entry.view.render(frame, area, ctx);
        }
    }
}
