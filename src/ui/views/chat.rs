use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use tui_textarea::TextArea;

use crate::core::conversation::ConversationId;
use crate::core::message::Role;
use crate::core::turn::TurnCoordinator;
use crate::ui::navigation::{
    ControlBinding, KeyPattern, TurnEvent, View, ViewAction, ViewCommand, ViewContext, ViewEvent,
    ViewKind,
};
use crate::ui::views::{describe_bindings, footer_hint, ModalView};
use crate::ui::wrap::wrap_text;

const SPINNER: [&str; 4] = ["·  ", "·· ", "···", " ··"];
const MAX_INPUT_LINES: u16 = 6;

/// Transcript of one conversation with an input box underneath.
pub struct ChatView {
    conversation_id: ConversationId,
    input: TextArea<'static>,
    /// Lines scrolled up from the bottom; 0 follows new output.
    scroll_back: u16,
    /// Transcript height at the last render, used as the page size.
    page_height: u16,
    notice: Option<String>,
}

impl ChatView {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            input: new_input(),
            scroll_back: 0,
            page_height: 10,
            notice: None,
        }
    }

    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    fn transcript_lines(session: &TurnCoordinator, width: usize, tick: u64) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for message in session.conversation().messages() {
            push_message(&mut lines, message.role, &message.content, width);
        }

        if let Some(partial) = session.partial_reply() {
            let spinner = SPINNER[(tick % SPINNER.len() as u64) as usize];
            if partial.is_empty() {
                lines.push(role_header(Role::Assistant));
                lines.push(Line::from(Span::styled(
                    spinner,
                    Style::default().fg(Color::DarkGray),
                )));
            } else {
                push_message(&mut lines, Role::Assistant, partial, width);
                lines.pop();
                lines.push(Line::from(Span::styled(
                    spinner,
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        lines
    }

    fn status_line(&self, session: Option<&TurnCoordinator>) -> Line<'static> {
        if let Some(notice) = &self.notice {
            return Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Red)));
        }
        let hint = footer_hint(&self.control_bindings());
        let state = match session {
            Some(s) if s.is_sending() => "streaming… ",
            Some(s) if s.can_retry() => "no reply yet · ",
            _ => "",
        };
        Line::from(Span::styled(
            format!("{state}{hint}"),
            Style::default().fg(Color::DarkGray),
        ))
    }
}

fn new_input() -> TextArea<'static> {
    let mut input = TextArea::default();
    input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title("Message (Enter to send, Alt+Enter for a new line)"),
    );
    input.set_cursor_line_style(Style::default());
    input.set_placeholder_text("Type a message…");
    input
}

fn role_header(role: Role) -> Line<'static> {
    let (label, color) = match role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("Assistant", Color::Green),
        Role::System => ("System", Color::Magenta),
    };
    Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

fn push_message(lines: &mut Vec<Line<'static>>, role: Role, content: &str, width: usize) {
    lines.push(role_header(role));
    let style = if role == Role::System {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    for wrapped in wrap_text(content, width) {
        lines.push(Line::from(Span::styled(wrapped, style)));
    }
    lines.push(Line::default());
}

impl View for ChatView {
    fn kind(&self) -> ViewKind {
        ViewKind::Chat
    }

    fn title(&self, ctx: &ViewContext) -> String {
        ctx.sessions
            .get(&self.conversation_id)
            .map(|s| {
                let conversation = s.conversation();
                format!("{} · {}", conversation.display_title(), conversation.model)
            })
            .unwrap_or_else(|| "Chat".to_string())
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &ViewContext) {
        let input_height = (self.input.lines().len() as u16).clamp(1, MAX_INPUT_LINES) + 2;
        let [transcript_area, input_area, status_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(input_height),
            Constraint::Length(1),
        ])
        .areas(area);

        let session = ctx.sessions.get(&self.conversation_id);
        let block = Block::default()
            .borders(Borders::TOP)
            .title(self.title(ctx));
        let inner = block.inner(transcript_area);
        let lines = session
            .map(|s| Self::transcript_lines(s, inner.width as usize, ctx.tick))
            .unwrap_or_default();

        self.page_height = inner.height.max(1);
        let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let max_scroll = total.saturating_sub(inner.height);
        self.scroll_back = self.scroll_back.min(max_scroll);
        let offset = max_scroll - self.scroll_back;

        frame.render_widget(
            Paragraph::new(lines).block(block).scroll((offset, 0)),
            transcript_area,
        );
        frame.render_widget(&self.input, input_area);
        frame.render_widget(Paragraph::new(self.status_line(session)), status_area);
    }

    fn control_bindings(&self) -> Vec<ControlBinding> {
        vec![
            ControlBinding::new(KeyPattern::ctrl(KeyCode::Char('c')), ViewAction::Quit, "quit"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Esc), ViewAction::Back, "back"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Enter), ViewAction::Send, "send"),
            ControlBinding::new(KeyPattern::ctrl(KeyCode::Char('x')), ViewAction::Cancel, "cancel"),
            ControlBinding::new(KeyPattern::ctrl(KeyCode::Char('r')), ViewAction::Retry, "retry"),
            ControlBinding::new(KeyPattern::ctrl(KeyCode::Char('t')), ViewAction::GenerateTitle, "title"),
            ControlBinding::new(KeyPattern::simple(KeyCode::PageUp), ViewAction::ScrollUp, "scroll up"),
            ControlBinding::new(KeyPattern::simple(KeyCode::PageDown), ViewAction::ScrollDown, "scroll down"),
            ControlBinding::new(KeyPattern::simple(KeyCode::F(1)), ViewAction::Help, "help"),
        ]
    }

    fn handle_action(&mut self, action: ViewAction, ctx: &ViewContext) -> Vec<ViewCommand> {
        let id = self.conversation_id.clone();
        match action {
            ViewAction::Quit => vec![ViewCommand::Exit],
            ViewAction::Back => vec![ViewCommand::Pop],
            ViewAction::Send => {
                let text = self.input_text();
                if text.trim().is_empty() {
                    return Vec::new();
                }
                vec![ViewCommand::SendMessage {
                    conversation_id: id,
                    text,
                }]
            }
            ViewAction::Cancel => {
                let sending = ctx.sessions.get(&id).is_some_and(|s| s.is_sending());
                if sending {
                    vec![ViewCommand::CancelTurn(id)]
                } else {
                    Vec::new()
                }
            }
            ViewAction::Retry => vec![ViewCommand::RetryTurn(id)],
            ViewAction::GenerateTitle => vec![ViewCommand::GenerateTitle(id)],
            ViewAction::ScrollUp => {
                self.scroll_back = self.scroll_back.saturating_add(self.page_height);
                Vec::new()
            }
            ViewAction::ScrollDown => {
                self.scroll_back = self.scroll_back.saturating_sub(self.page_height);
                Vec::new()
            }
            ViewAction::Help => {
                let body = describe_bindings(&self.control_bindings()).join("\n");
                vec![ViewCommand::Push(Box::new(ModalView::notice("Chat keys", body)))]
            }
            _ => Vec::new(),
        }
    }

    fn handle_input(&mut self, key: KeyEvent, _ctx: &ViewContext) -> Vec<ViewCommand> {
        // Alt+Enter reaches the text area as a plain newline.
        let key = if key.code == KeyCode::Enter && key.modifiers.contains(KeyModifiers::ALT) {
            KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)
        } else {
            key
        };
        self.input.input(tui_textarea::Input::from(key));
        Vec::new()
    }

    fn handle_event(&mut self, event: &ViewEvent, _ctx: &ViewContext) -> Vec<ViewCommand> {
        match event {
            ViewEvent::Turn {
                conversation_id,
                event,
            } if *conversation_id == self.conversation_id => match event {
                TurnEvent::Started => {
                    self.input = new_input();
                    self.notice = None;
                    self.scroll_back = 0;
                }
                TurnEvent::Failed(error) => {
                    self.notice = Some(format!("{error} · Ctrl+R to retry"));
                }
                TurnEvent::Replied | TurnEvent::Cancelled => self.notice = None,
                TurnEvent::TitleFailed(error) => {
                    self.notice = Some(format!("Could not generate a title: {error}"));
                }
                TurnEvent::Delta | TurnEvent::Titled(_) => {}
            },
            ViewEvent::Notice(message) => self.notice = Some(message.clone()),
            ViewEvent::Paste(text) => {
                self.input.insert_str(text.replace("\r\n", "\n").replace('\r', "\n"));
            }
            _ => {}
        }
        Vec::new()
    }

    fn on_resume(&mut self) {
        self.notice = None;
    }

    fn conversation_id(&self) -> Option<&ConversationId> {
        Some(&self.conversation_id)
    }
}
