//! Built inline keyboards as handed to the transport.
//!
//! Keyboards are produced by `kbot-keyboard`'s builder and are immutable afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback payload carried by buttons that do nothing when pressed.
pub const NOOP_CALLBACK: &str = "-";

/// Identity of the registration scope a keyboard's callback tokens live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyboardId(pub u64);

impl fmt::Display for KeyboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kb#{}", self.0)
    }
}

/// What pressing a button sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    /// Opaque callback token resolved by the dispatcher on press.
    Callback(String),
    /// Decorative button; the press is acknowledged and otherwise ignored.
    Inert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    /// Payload the transport attaches to this button.
    pub fn callback_data(&self) -> &str {
        match &self.action {
            ButtonAction::Callback(token) => token,
            ButtonAction::Inert => NOOP_CALLBACK,
        }
    }

    pub fn is_inert(&self) -> bool {
        matches!(self.action, ButtonAction::Inert)
    }
}

/// Rows of buttons plus the registration scope that owns their tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    rows: Vec<Vec<Button>>,
    scope: Option<KeyboardId>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>, scope: Option<KeyboardId>) -> Self {
        Self { rows, scope }
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.rows
    }

    /// Registration scope released when this keyboard is superseded; `None` when every
    /// token is global or inert.
    pub fn scope(&self) -> Option<KeyboardId> {
        self.scope
    }

    pub fn row_sizes(&self) -> Vec<usize> {
        self.rows.iter().map(Vec::len).collect()
    }

    pub fn button_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.button_count() == 0
    }

    /// Buttons in reading order (row by row, left to right).
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Button at reading-order position `index`.
    pub fn button(&self, index: usize) -> Option<&Button> {
        self.buttons().nth(index)
    }

    /// First button carrying `label`.
    pub fn find(&self, label: &str) -> Option<&Button> {
        self.buttons().find(|b| b.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(label: &str, token: Option<&str>) -> Button {
        Button {
            label: label.to_string(),
            action: token
                .map(|t| ButtonAction::Callback(t.to_string()))
                .unwrap_or(ButtonAction::Inert),
        }
    }

    #[test]
    fn test_reading_order_and_lookup() {
        let kb = Keyboard::new(
            vec![
                vec![button("a", Some("d1.0")), button("b", None)],
                vec![button("c", Some("d1.1"))],
            ],
            Some(KeyboardId(1)),
        );

        assert_eq!(kb.row_sizes(), vec![2, 1]);
        assert_eq!(kb.button_count(), 3);
        assert_eq!(kb.button(2).map(|b| b.label.as_str()), Some("c"));
        assert_eq!(kb.find("b").map(Button::callback_data), Some(NOOP_CALLBACK));
        assert!(kb.find("b").is_some_and(Button::is_inert));
        assert!(kb.find("zzz").is_none());
        assert_eq!(kb.scope(), Some(KeyboardId(1)));
    }
}
