use super::*;
use crate::core::app::{apply_action, AppAction, AppCommand};
use crate::core::message::Role;
use crate::core::requestor::StreamOutcome;
use crate::core::store::MemoryStore;
use crate::core::turn::{StreamJob, TurnKind};
use crate::ui::navigation::ViewKind;
use crate::utils::test_utils::{create_test_app, ctrl, key, test_settings, type_text};
use ratatui::crossterm::event::KeyCode;

struct BrokenStore;

impl ConversationStore for BrokenStore {
    fn load(&self, id: &ConversationId) -> Result<Conversation, StoreError> {
        Err(StoreError::NotFound(id.clone()))
    }

    fn save(&self, _conversation: &Conversation) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("unreadable")))
    }

    fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.clone()))
    }
}

fn only_job(commands: Vec<AppCommand>) -> StreamJob {
    let mut jobs: Vec<StreamJob> = commands
        .into_iter()
        .map(|command| match command {
            AppCommand::SpawnStream(job) => job,
        })
        .collect();
    assert_eq!(jobs.len(), 1, "expected exactly one stream job");
    jobs.remove(0)
}

fn send_in_new_chat(app: &mut App, text: &str) -> StreamJob {
    assert!(app.handle_key(key(KeyCode::Char('n'))).is_empty());
    assert_eq!(app.nav.active_kind(), ViewKind::Chat);
    type_text(app, text);
    only_job(app.handle_key(key(KeyCode::Enter)))
}

fn finish(app: &mut App, job: &StreamJob, content: &str) -> Vec<AppCommand> {
    apply_action(
        app,
        AppAction::TurnFinished {
            conversation_id: job.conversation_id.clone(),
            turn_id: job.turn_id,
            kind: job.kind,
            result: Ok(StreamOutcome::Completed(content.to_string())),
        },
    )
}

#[test]
fn sending_streams_and_persists_the_reply() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "hello");
    assert_eq!(job.kind, TurnKind::Reply);
    assert!(app.has_active_turns());

    let id = job.conversation_id.clone();
    let saved = app.store.load(&id).unwrap();
    assert_eq!(saved.messages().len(), 1, "user message is saved before the reply");

    apply_action(
        &mut app,
        AppAction::TurnDelta {
            conversation_id: id.clone(),
            turn_id: job.turn_id,
            delta: "Hi ".into(),
        },
    );
    assert_eq!(app.sessions.get(&id).unwrap().partial_reply(), Some("Hi "));

    assert!(finish(&mut app, &job, "Hi there").is_empty());
    assert!(!app.has_active_turns());

    let saved = app.store.load(&id).unwrap();
    let roles: Vec<Role> = saved.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(saved.messages()[1].content, "Hi there");
}

#[test]
fn second_send_while_streaming_is_rejected() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "first");

    type_text(&mut app, "second");
    assert!(app.handle_key(key(KeyCode::Enter)).is_empty());

    let conversation = app.sessions.get(&job.conversation_id).unwrap().conversation();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].content, "first");
}

#[test]
fn cancel_rolls_back_and_ignores_the_late_result() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "never mind");
    let id = job.conversation_id.clone();

    assert!(app.handle_key(ctrl('x')).is_empty());
    assert!(job.cancel.is_cancelled());
    assert!(!app.has_active_turns());
    assert!(app.sessions.get(&id).unwrap().conversation().is_empty());
    assert!(
        matches!(app.store.load(&id), Err(StoreError::NotFound(_))),
        "a conversation with nothing left is removed from storage"
    );

    finish(&mut app, &job, "too late");
    assert!(app.sessions.get(&id).unwrap().conversation().is_empty());
}

#[test]
fn failed_reply_keeps_the_message_for_retry() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "hello");
    let id = job.conversation_id.clone();

    apply_action(
        &mut app,
        AppAction::TurnFinished {
            conversation_id: id.clone(),
            turn_id: job.turn_id,
            kind: TurnKind::Reply,
            result: Err(crate::core::error::StreamError::HttpStatus {
                code: 500,
                message: "boom".into(),
            }),
        },
    );
    assert!(app.sessions.get(&id).unwrap().can_retry());

    let retry = only_job(app.handle_key(ctrl('r')));
    assert_eq!(retry.conversation_id, id);
    assert!(retry.turn_id > job.turn_id);
    assert_eq!(retry.request.messages.len(), 1);
}

#[test]
fn results_reach_a_conversation_after_its_view_is_gone() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "background");
    let id = job.conversation_id.clone();

    app.handle_key(key(KeyCode::Esc));
    assert_eq!(app.nav.active_kind(), ViewKind::Menu);
    assert!(app.sessions.contains(&id), "a conversation with a message is kept");

    let other = send_in_new_chat(&mut app, "foreground");
    assert_ne!(other.conversation_id, id);

    finish(&mut app, &job, "done in the background");
    assert_eq!(app.nav.active_kind(), ViewKind::Chat);
    assert!(app.sessions.get(&other.conversation_id).unwrap().is_sending());

    let background = app.sessions.get(&id).unwrap().conversation();
    assert_eq!(background.len(), 2);
    assert_eq!(
        background.last().map(|m| m.content.as_str()),
        Some("done in the background")
    );
}

#[test]
fn blank_conversation_is_discarded_on_back() {
    let mut app = create_test_app();
    app.handle_key(key(KeyCode::Char('n')));
    assert_eq!(app.sessions.len(), 1);

    app.handle_key(key(KeyCode::Esc));
    assert!(app.sessions.is_empty());
    assert_eq!(app.nav.depth(), 1);
}

#[test]
fn delete_goes_through_a_confirmation() {
    let mut app = create_test_app();
    let job = send_in_new_chat(&mut app, "delete me");
    finish(&mut app, &job, "ok");
    app.handle_key(key(KeyCode::Esc));

    app.handle_key(key(KeyCode::Down));
    app.handle_key(key(KeyCode::Char('d')));
    assert_eq!(app.nav.active_kind(), ViewKind::Modal);

    app.handle_key(key(KeyCode::Esc));
    assert_eq!(app.nav.active_kind(), ViewKind::Menu);
    assert_eq!(app.sessions.len(), 1, "dismissing the modal keeps the chat");

    app.handle_key(key(KeyCode::Char('d')));
    app.handle_key(key(KeyCode::Enter));
    assert_eq!(app.nav.active_kind(), ViewKind::Menu);
    assert!(app.sessions.is_empty());
    assert!(app.store.list().unwrap().is_empty());
}

#[test]
fn first_reply_triggers_an_automatic_title() {
    let mut app = App::new(AppSetup {
        settings: test_settings(),
        default_model: "test-model".into(),
        system_prompt: Some("Be brief.".into()),
        store: Box::new(MemoryStore::new()),
        auto_title: true,
    });
    let job = send_in_new_chat(&mut app, "tell me about owls");
    assert_eq!(job.request.messages[0].role, "system");

    let title_job = only_job(finish(&mut app, &job, "Owls are birds."));
    assert_eq!(title_job.kind, TurnKind::Title);

    finish(&mut app, &title_job, "\"Owl Facts\"");
    let saved = app.store.load(&job.conversation_id).unwrap();
    assert_eq!(saved.title.as_deref(), Some("Owl Facts"));

    type_text(&mut app, "more");
    let second = only_job(app.handle_key(key(KeyCode::Enter)));
    assert!(
        finish(&mut app, &second, "They hoot.").is_empty(),
        "only the first reply names the conversation"
    );
}

#[test]
fn unreadable_store_opens_with_an_error_modal() {
    let app = App::new(AppSetup {
        settings: test_settings(),
        default_model: "test-model".into(),
        system_prompt: None,
        store: Box::new(BrokenStore),
        auto_title: false,
    });
    assert!(app.sessions.is_empty());
    assert_eq!(app.nav.active_kind(), ViewKind::Modal);
}

#[test]
fn save_failures_do_not_stop_the_turn() {
    let mut app = App::new(AppSetup {
        settings: test_settings(),
        default_model: "test-model".into(),
        system_prompt: None,
        store: Box::new(BrokenStore),
        auto_title: false,
    });
    app.handle_key(key(KeyCode::Enter));
    assert_eq!(app.nav.active_kind(), ViewKind::Menu);

    let job = send_in_new_chat(&mut app, "hello");
    finish(&mut app, &job, "hi");
    assert_eq!(app.sessions.get(&job.conversation_id).unwrap().conversation().len(), 2);
}

#[test]
fn shutdown_cancels_streams_and_saves_the_rollback() {
    let mut app = create_test_app();
    let first = send_in_new_chat(&mut app, "first");
    finish(&mut app, &first, "reply");
    type_text(&mut app, "second");
    let second = only_job(app.handle_key(key(KeyCode::Enter)));

    app.shutdown();
    assert!(second.cancel.is_cancelled());
    let saved = app.store.load(&first.conversation_id).unwrap();
    assert_eq!(saved.len(), 2, "the unanswered message is rolled back");
}

#[test]
fn quit_requests_exit_from_any_view() {
    let mut app = create_test_app();
    app.handle_key(key(KeyCode::Char('n')));
    app.handle_key(ctrl('c'));
    assert!(app.exit_requested);
}
