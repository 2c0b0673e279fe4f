use ratatui::crossterm::event::KeyCode;
use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::ui::navigation::{
    ControlBinding, KeyPattern, View, ViewAction, ViewCommand, ViewContext, ViewKind,
};
use crate::ui::views::footer_hint;

enum ModalKind {
    /// Runs the stored command when confirmed.
    Confirm { on_confirm: Option<ViewCommand> },
    Notice { error: bool },
}

/// A small dialog drawn over the view beneath it.
pub struct ModalView {
    title: String,
    body: String,
    kind: ModalKind,
}

impl ModalView {
    pub fn confirm(
        title: impl Into<String>,
        body: impl Into<String>,
        on_confirm: ViewCommand,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind: ModalKind::Confirm {
                on_confirm: Some(on_confirm),
            },
        }
    }

    pub fn notice(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind: ModalKind::Notice { error: false },
        }
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            body: body.into(),
            kind: ModalKind::Notice { error: true },
        }
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(self.kind, ModalKind::Confirm { .. })
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl View for ModalView {
    fn kind(&self) -> ViewKind {
        ViewKind::Modal
    }

    fn title(&self, _ctx: &ViewContext) -> String {
        self.title.clone()
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, _ctx: &ViewContext) {
        let body_lines = self.body.lines().count().max(1) as u16;
        let popup = centered(area, 60, body_lines + 4);

        let border = match self.kind {
            ModalKind::Notice { error: true } => Color::Red,
            ModalKind::Confirm { .. } => Color::Yellow,
            ModalKind::Notice { error: false } => Color::Cyan,
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(Line::from(format!(" {} ", self.title)).style(Style::default().add_modifier(Modifier::BOLD)))
            .title_bottom(Line::from(format!(" {} ", footer_hint(&self.control_bindings()))));

        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(self.body.as_str())
                .block(block)
                .wrap(Wrap { trim: false }),
            popup,
        );
    }

    fn control_bindings(&self) -> Vec<ControlBinding> {
        match self.kind {
            ModalKind::Confirm { .. } => vec![
                ControlBinding::new(KeyPattern::simple(KeyCode::Enter), ViewAction::Confirm, "confirm"),
                ControlBinding::new(KeyPattern::simple(KeyCode::Char('y')), ViewAction::Confirm, "confirm"),
                ControlBinding::new(KeyPattern::simple(KeyCode::Esc), ViewAction::Dismiss, "cancel"),
                ControlBinding::new(KeyPattern::simple(KeyCode::Char('n')), ViewAction::Dismiss, "cancel"),
            ],
            ModalKind::Notice { .. } => vec![
                ControlBinding::new(KeyPattern::simple(KeyCode::Enter), ViewAction::Dismiss, "close"),
                ControlBinding::new(KeyPattern::simple(KeyCode::Esc), ViewAction::Dismiss, "close"),
                ControlBinding::new(KeyPattern::simple(KeyCode::Char('q')), ViewAction::Dismiss, "close"),
            ],
        }
    }

    fn handle_action(&mut self, action: ViewAction, _ctx: &ViewContext) -> Vec<ViewCommand> {
        match action {
            ViewAction::Confirm => {
                let mut commands = vec![ViewCommand::Pop];
                if let ModalKind::Confirm { on_confirm } = &mut self.kind {
                    commands.extend(on_confirm.take());
                }
                commands
            }
            ViewAction::Dismiss => vec![ViewCommand::Pop],
            _ => Vec::new(),
        }
    }
}

fn centered(area: Rect, percent_width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Percentage(percent_width)])
        .flex(Flex::Center)
        .areas(row);
    popup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::ConversationId;
    use crate::core::session::SessionRegistry;
    use crate::ui::navigation::NavigationStack;
    use crate::utils::test_utils::key;

    #[test]
    fn confirming_pops_then_runs_the_command_once() {
        let sessions = SessionRegistry::new();
        let ctx = ViewContext {
            sessions: &sessions,
            tick: 0,
        };
        let mut modal = ModalView::confirm(
            "Delete chat",
            "Really?",
            ViewCommand::DeleteConversation(ConversationId::new("c")),
        );

        let commands = modal.handle_action(ViewAction::Confirm, &ctx);
        assert!(matches!(
            commands.as_slice(),
            [ViewCommand::Pop, ViewCommand::DeleteConversation(id)] if id.as_str() == "c"
        ));
        let again = modal.handle_action(ViewAction::Confirm, &ctx);
        assert!(matches!(again.as_slice(), [ViewCommand::Pop]));
    }

    #[test]
    fn escape_dismisses_without_running_the_command() {
        let sessions = SessionRegistry::new();
        let ctx = ViewContext {
            sessions: &sessions,
            tick: 0,
        };
        let mut nav = NavigationStack::new(Box::new(ModalView::notice("root", "")));
        nav.push(Box::new(ModalView::confirm(
            "Delete chat",
            "Really?",
            ViewCommand::Exit,
        )));

        let commands = nav.dispatch_key(key(KeyCode::Esc), &ctx);
        assert!(matches!(commands.as_slice(), [ViewCommand::Pop]));
        let commands = nav.dispatch_key(key(KeyCode::Char('n')), &ctx);
        assert!(matches!(commands.as_slice(), [ViewCommand::Pop]));
    }

    #[test]
    fn centered_popup_fits_inside_the_area() {
        let area = Rect::new(0, 0, 100, 10);
        let popup = centered(area, 60, 20);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 10);
        assert_eq!(popup.x, 20);
    }
}
