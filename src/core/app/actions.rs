use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::App;
use crate::core::conversation::ConversationId;
use crate::core::error::StreamError;
use crate::core::requestor::StreamOutcome;
use crate::core::turn::{StreamJob, TurnId, TurnKind, TurnResolution};
use crate::ui::navigation::TurnEvent;

/// Messages from stream workers back to the event loop.
#[derive(Debug)]
pub enum AppAction {
    TurnDelta {
        conversation_id: ConversationId,
        turn_id: TurnId,
        delta: String,
    },
    TurnFinished {
        conversation_id: ConversationId,
        turn_id: TurnId,
        kind: TurnKind,
        result: Result<StreamOutcome, StreamError>,
    },
}

#[derive(Clone)]
pub struct AppActionDispatcher {
    tx: mpsc::UnboundedSender<AppAction>,
}

impl AppActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<AppAction>) -> Self {
        Self { tx }
    }

    /// Sends one action; a closed loop means the app is shutting down, so
    /// the action is dropped.
    pub fn dispatch(&self, action: AppAction) {
        if self.tx.send(action).is_err() {
            debug!("Event loop gone; dropping action");
        }
    }
}

/// Side effects the event loop performs on the app's behalf.
#[derive(Debug)]
pub enum AppCommand {
    SpawnStream(StreamJob),
}

pub fn apply_actions(app: &mut App, actions: impl IntoIterator<Item = AppAction>) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for action in actions {
        commands.extend(apply_action(app, action));
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction) -> Vec<AppCommand> {
    match action {
        AppAction::TurnDelta {
            conversation_id,
            turn_id,
            delta,
        } => {
            let Some(coordinator) = app.sessions.get_mut(&conversation_id) else {
                return Vec::new();
            };
            coordinator.push_delta(turn_id, &delta);
            app.notify_origin(&conversation_id, TurnEvent::Delta)
        }
        AppAction::TurnFinished {
            conversation_id,
            turn_id,
            kind,
            result,
        } => {
            let Some(coordinator) = app.sessions.get_mut(&conversation_id) else {
                debug!(conversation = %conversation_id, turn_id, "Result for a removed conversation");
                return Vec::new();
            };
            let resolution = coordinator.resolve(turn_id, kind, result);
            apply_resolution(app, &conversation_id, resolution)
        }
    }
}

fn apply_resolution(
    app: &mut App,
    conversation_id: &ConversationId,
    resolution: TurnResolution,
) -> Vec<AppCommand> {
    let event = match resolution {
        TurnResolution::Stale => return Vec::new(),
        TurnResolution::Replied { .. } => TurnEvent::Replied,
        TurnResolution::Failed(error) => TurnEvent::Failed(error),
        TurnResolution::Cancelled => TurnEvent::Cancelled,
        TurnResolution::Titled(title) => TurnEvent::Titled(title),
        TurnResolution::TitleFailed(error) => {
            warn!(conversation = %conversation_id, error = %error, "Title generation failed");
            TurnEvent::TitleFailed(error)
        }
    };

    let mut commands = Vec::new();
    if !matches!(event, TurnEvent::TitleFailed(_)) {
        app.persist(conversation_id);
    }
    if event == TurnEvent::Replied {
        commands.extend(app.maybe_auto_title(conversation_id));
    }
    commands.extend(app.notify_origin(conversation_id, event));
    commands
}
