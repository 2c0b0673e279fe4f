mod chat;
mod menu;
mod modal;

pub use chat::ChatView;
pub use menu::MenuView;
pub use modal::ModalView;

use crate::ui::navigation::ControlBinding;

/// One `key  label` line per binding, for help text and footers.
pub(crate) fn describe_bindings(bindings: &[ControlBinding]) -> Vec<String> {
    bindings
        .iter()
        .map(|binding| format!("{:<10} {}", binding.pattern.describe(), binding.label))
        .collect()
}

/// Compact single-line hint showing the first key for each action.
pub(crate) fn footer_hint(bindings: &[ControlBinding]) -> String {
    let mut seen = Vec::new();
    let mut parts = Vec::new();
    for binding in bindings {
        if seen.contains(&binding.action) {
            continue;
        }
        seen.push(binding.action);
        parts.push(format!("{} {}", binding.pattern.describe(), binding.label));
    }
    parts.join(" · ")
}
