use chrono::Local;
use ratatui::crossterm::event::KeyCode;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use crate::core::conversation::ConversationId;
use crate::ui::navigation::{
    ControlBinding, KeyPattern, View, ViewAction, ViewCommand, ViewContext, ViewKind,
};
use crate::ui::views::{footer_hint, ModalView};
use crate::ui::wrap::truncate_to_width;

const SPINNER: [char; 4] = ['⠋', '⠙', '⠹', '⠸'];

#[derive(Debug, Clone, PartialEq)]
enum MenuEntry {
    NewChat,
    Chat(ConversationId),
}

/// Root view: the list of conversations plus a "new chat" entry.
pub struct MenuView {
    list_state: ListState,
}

impl MenuView {
    pub fn new() -> Self {
        Self {
            list_state: ListState::default().with_selected(Some(0)),
        }
    }

    fn entries(ctx: &ViewContext) -> Vec<MenuEntry> {
        std::iter::once(MenuEntry::NewChat)
            .chain(
                ctx.sessions
                    .ordered()
                    .into_iter()
                    .map(|c| MenuEntry::Chat(c.id().clone())),
            )
            .collect()
    }

    fn selected_index(&self, len: usize) -> usize {
        self.list_state.selected().unwrap_or(0).min(len.saturating_sub(1))
    }

    fn selected_entry(&self, ctx: &ViewContext) -> Option<MenuEntry> {
        let entries = Self::entries(ctx);
        entries.get(self.selected_index(entries.len())).cloned()
    }

    fn entry_line(entry: &MenuEntry, ctx: &ViewContext, width: usize) -> Line<'static> {
        let MenuEntry::Chat(id) = entry else {
            return Line::from(Span::styled(
                "+ New chat",
                Style::default().fg(Color::Green),
            ));
        };
        let Some(session) = ctx.sessions.get(id) else {
            return Line::from("");
        };

        let conversation = session.conversation();
        let marker = if session.is_sending() {
            SPINNER[(ctx.tick % SPINNER.len() as u64) as usize]
        } else {
            ' '
        };
        let details = format!(
            "  {} · {} msgs · {}",
            conversation.model,
            conversation.len(),
            conversation
                .updated_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        );
        let title_width = width.saturating_sub(details.width() + 2).max(8);
        Line::from(vec![
            Span::styled(format!("{marker} "), Style::default().fg(Color::Yellow)),
            Span::raw(truncate_to_width(&conversation.display_title(), title_width)),
            Span::styled(details, Style::default().fg(Color::DarkGray)),
        ])
    }
}

impl Default for MenuView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for MenuView {
    fn kind(&self) -> ViewKind {
        ViewKind::Menu
    }

    fn title(&self, _ctx: &ViewContext) -> String {
        "Chats".to_string()
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &ViewContext) {
        let [header, body, footer] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .areas(area);

        let active = ctx.sessions.sending_count();
        let status = if active > 0 {
            format!(" · {active} streaming")
        } else {
            String::new()
        };
        frame.render_widget(
            Paragraph::new(format!(
                "parley v{} · {} chats{status}",
                env!("CARGO_PKG_VERSION"),
                ctx.sessions.len()
            ))
            .style(Style::default().add_modifier(Modifier::BOLD)),
            header,
        );

        let entries = Self::entries(ctx);
        let selected = self.selected_index(entries.len());
        self.list_state.select(Some(selected));
        let width = body.width.saturating_sub(4) as usize;
        let items: Vec<ListItem> = entries
            .iter()
            .map(|entry| ListItem::new(Self::entry_line(entry, ctx, width)))
            .collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(self.title(ctx)))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, body, &mut self.list_state);

        frame.render_widget(
            Paragraph::new(footer_hint(&self.control_bindings()))
                .style(Style::default().fg(Color::DarkGray)),
            footer,
        );
    }

    fn control_bindings(&self) -> Vec<ControlBinding> {
        vec![
            ControlBinding::new(KeyPattern::ctrl(KeyCode::Char('c')), ViewAction::Quit, "quit"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Up), ViewAction::MoveUp, "up"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Char('k')), ViewAction::MoveUp, "up"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Down), ViewAction::MoveDown, "down"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Char('j')), ViewAction::MoveDown, "down"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Enter), ViewAction::Select, "open"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Char('n')), ViewAction::NewChat, "new"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Char('d')), ViewAction::DeleteChat, "delete"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Delete), ViewAction::DeleteChat, "delete"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Char('q')), ViewAction::Quit, "quit"),
            ControlBinding::new(KeyPattern::simple(KeyCode::Esc), ViewAction::Quit, "quit"),
        ]
    }

    fn handle_action(&mut self, action: ViewAction, ctx: &ViewContext) -> Vec<ViewCommand> {
        let len = Self::entries(ctx).len();
        let selected = self.selected_index(len);
        match action {
            ViewAction::MoveUp => {
                let next = if selected == 0 { len - 1 } else { selected - 1 };
                self.list_state.select(Some(next));
                Vec::new()
            }
            ViewAction::MoveDown => {
                self.list_state.select(Some((selected + 1) % len));
                Vec::new()
            }
            ViewAction::Select => match self.selected_entry(ctx) {
                Some(MenuEntry::Chat(id)) => vec![ViewCommand::OpenConversation(id)],
                Some(MenuEntry::NewChat) | None => vec![ViewCommand::NewConversation],
            },
            ViewAction::NewChat => vec![ViewCommand::NewConversation],
            ViewAction::DeleteChat => {
                let Some(MenuEntry::Chat(id)) = self.selected_entry(ctx) else {
                    return Vec::new();
                };
                let title = ctx
                    .sessions
                    .get(&id)
                    .map(|s| s.conversation().display_title())
                    .unwrap_or_default();
                vec![ViewCommand::Push(Box::new(ModalView::confirm(
                    "Delete chat",
                    format!("Delete \"{title}\"? This cannot be undone."),
                    ViewCommand::DeleteConversation(id),
                )))]
            }
            ViewAction::Quit => vec![ViewCommand::Exit],
            _ => Vec::new(),
        }
    }
}
