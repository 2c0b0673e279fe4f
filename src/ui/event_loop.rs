//! Event polling, dispatching, and UI rendering loop.
//!
//! One task owns the [`App`] and `select!`s over terminal input (forwarded
//! from a blocking poller thread), worker results, and a redraw tick. Stream
//! workers are spawned from here and never see the app itself.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ratatui::backend::Backend;
use ratatui::crossterm::event::{self, Event, KeyEventKind};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::app::{apply_actions, App, AppAction, AppActionDispatcher, AppCommand};
use crate::core::chat_stream::ChatStreamService;
use crate::core::requestor::StreamRequestor;
use crate::ui::lifecycle::{install_panic_hook, restore_terminal, setup_terminal, AppTerminal};

const FRAME_DURATION: Duration = Duration::from_millis(16);
const TICK_INTERVAL: Duration = Duration::from_millis(120);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

struct EventReader {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EventReader {
    fn spawn(event_tx: mpsc::UnboundedSender<UiEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("terminal-events".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    match event::poll(POLL_INTERVAL) {
                        Ok(true) => match event::read() {
                            Ok(ev) => {
                                if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                                    break;
                                }
                            }
                            Err(err) => debug!(error = %err, "Terminal read failed"),
                        },
                        Ok(false) => {}
                        Err(err) => {
                            warn!(error = %err, "Terminal poll failed; stopping input");
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Applies one terminal event; returns whether the screen needs redrawing.
fn handle_ui_event(app: &mut App, event: UiEvent, commands: &mut Vec<AppCommand>) -> bool {
    let UiEvent::Crossterm(event) = event;
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            commands.extend(app.handle_key(key));
            true
        }
        Event::Paste(text) => {
            commands.extend(app.handle_paste(text));
            true
        }
        Event::Resize(..) => true,
        _ => false,
    }
}

fn run_commands(service: &ChatStreamService, commands: Vec<AppCommand>) {
    for command in commands {
        match command {
            AppCommand::SpawnStream(job) => {
                debug!(conversation = %job.conversation_id, turn_id = job.turn_id, "Spawning stream worker");
                service.spawn_stream(job);
            }
        }
    }
}

fn try_draw_frame<B: Backend>(
    app: &mut App,
    terminal: &mut Terminal<B>,
    request_redraw: &mut bool,
    last_draw: &mut Instant,
) -> std::io::Result<()> {
    if !*request_redraw {
        return Ok(());
    }

    let now = Instant::now();
    if now.duration_since(*last_draw) < FRAME_DURATION {
        return Ok(());
    }

    terminal.draw(|frame| app.render(frame))?;
    *last_draw = now;
    *request_redraw = false;
    Ok(())
}

async fn drive(
    app: &mut App,
    terminal: &mut AppTerminal,
    requestor: StreamRequestor,
) -> Result<(), Box<dyn Error>> {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<AppAction>();
    let service = ChatStreamService::new(requestor, AppActionDispatcher::new(action_tx));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut reader = EventReader::spawn(event_tx)?;

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut request_redraw = true;
    let mut last_draw = Instant::now()
        .checked_sub(FRAME_DURATION)
        .unwrap_or_else(Instant::now);

    loop {
        try_draw_frame(app, terminal, &mut request_redraw, &mut last_draw)?;

        let next_frame = tokio::time::Instant::from_std(last_draw + FRAME_DURATION);
        let mut commands = Vec::new();
        tokio::select! {
            Some(event) = event_rx.recv() => {
                if handle_ui_event(app, event, &mut commands) {
                    request_redraw = true;
                }
            }
            Some(action) = action_rx.recv() => {
                let mut actions = vec![action];
                while let Ok(more) = action_rx.try_recv() {
                    actions.push(more);
                }
                commands.extend(apply_actions(app, actions));
                request_redraw = true;
            }
            _ = tick.tick() => {
                commands.extend(app.tick());
                if app.has_active_turns() {
                    request_redraw = true;
                }
            }
            _ = tokio::time::sleep_until(next_frame), if request_redraw => {}
        }

        run_commands(&service, commands);
        if app.exit_requested {
            break;
        }
    }

    reader.stop();
    Ok(())
}

/// Runs the interactive session until the user exits.
pub async fn run_chat(mut app: App, requestor: StreamRequestor) -> Result<(), Box<dyn Error>> {
    install_panic_hook();
    let mut terminal = setup_terminal()?;
    info!("Interactive session started");

    let result = drive(&mut app, &mut terminal, requestor).await;

    app.shutdown();
    let restored = restore_terminal(&mut terminal);
    result?;
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{create_test_app, ctrl, key};
    use ratatui::backend::TestBackend;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventState, KeyModifiers};

    #[test]
    fn key_releases_are_ignored() {
        let mut app = create_test_app();
        let mut commands = Vec::new();
        let release = KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };

        assert!(!handle_ui_event(&mut app, UiEvent::Crossterm(Event::Key(release)), &mut commands));
        assert!(!app.exit_requested);

        assert!(handle_ui_event(&mut app, UiEvent::Crossterm(Event::Key(ctrl('c'))), &mut commands));
        assert!(app.exit_requested);
    }

    #[test]
    fn paste_goes_to_the_chat_input_not_the_bindings() {
        let mut app = create_test_app();
        let mut commands = Vec::new();
        handle_ui_event(&mut app, UiEvent::Crossterm(Event::Key(key(KeyCode::Char('n')))), &mut commands);
        handle_ui_event(&mut app, UiEvent::Crossterm(Event::Paste("q\nline two".into())), &mut commands);

        assert!(!app.exit_requested);
        assert!(commands.is_empty());
    }

    #[test]
    fn frames_are_throttled() {
        let mut app = create_test_app();
        let mut terminal = Terminal::new(TestBackend::new(40, 10)).unwrap();
        let mut request_redraw = true;
        let mut last_draw = Instant::now();

        try_draw_frame(&mut app, &mut terminal, &mut request_redraw, &mut last_draw).unwrap();
        assert!(request_redraw, "a frame right after the last one stays pending");

        last_draw = Instant::now().checked_sub(FRAME_DURATION).unwrap();
        try_draw_frame(&mut app, &mut terminal, &mut request_redraw, &mut last_draw).unwrap();
        assert!(!request_redraw);
    }
}
