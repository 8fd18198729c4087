//! Packs button specs into a bounded grid and attaches callback tokens.

use std::sync::Arc;

use kbot_core::{BuildError, Button, ButtonAction, Keyboard, KeyboardId};
use tracing::debug;

use crate::registry::{Encoding, Registry};

/// Transport limits a keyboard must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardLimits {
    /// Widest allowed row.
    pub max_columns: usize,
    /// Callback payload budget per button (Telegram: 64 bytes).
    pub max_token_bytes: usize,
    /// Budget for label plus payload of one button.
    pub max_button_bytes: usize,
}

impl Default for KeyboardLimits {
    fn default() -> Self {
        Self {
            max_columns: 8,
            max_token_bytes: 64,
            max_button_bytes: 256,
        }
    }
}

/// A button before it is built: a label and the handler pressing it should run.
pub struct ButtonSpec<H: ?Sized> {
    pub label: String,
    /// `None` makes the button inert.
    pub handler: Option<Arc<H>>,
}

impl<H: ?Sized> ButtonSpec<H> {
    pub fn new(label: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            label: label.into(),
            handler: Some(handler),
        }
    }

    pub fn inert(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handler: None,
        }
    }
}

impl<H: ?Sized> Clone for ButtonSpec<H> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// Builds keyboards against a shared [`Registry`].
pub struct KeyboardBuilder<H: ?Sized> {
    registry: Arc<Registry<H>>,
    limits: KeyboardLimits,
}

impl<H: ?Sized> Clone for KeyboardBuilder<H> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            limits: self.limits,
        }
    }
}

impl<H: ?Sized> KeyboardBuilder<H> {
    pub fn new(registry: Arc<Registry<H>>, limits: KeyboardLimits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &Arc<Registry<H>> {
        &self.registry
    }

    pub fn limits(&self) -> KeyboardLimits {
        self.limits
    }

    /// Builds a keyboard for `chat_id`, `columns` buttons per row.
    ///
    /// Fails without side effects when the grid or any button exceeds the limits; scoped
    /// registrations made before the failure are released.
    pub fn build(
        &self,
        chat_id: i64,
        columns: usize,
        encoding: Encoding,
        buttons: Vec<ButtonSpec<H>>,
    ) -> Result<Keyboard, BuildError> {
        if columns == 0 {
            return Err(BuildError::ZeroColumns);
        }
        if columns > self.limits.max_columns {
            return Err(BuildError::TooManyColumns {
                requested: columns,
                max: self.limits.max_columns,
            });
        }

        let needs_scope =
            encoding == Encoding::DenseIndex && buttons.iter().any(|b| b.handler.is_some());
        let scope = needs_scope.then(|| self.registry.open_scope(chat_id));

        match self.encode_all(scope, encoding, buttons) {
            Ok(built) => {
                let rows: Vec<Vec<Button>> = built
                    .chunks(columns)
                    .map(<[Button]>::to_vec)
                    .collect();
                debug!(
                    chat_id = chat_id,
                    scope = ?scope,
                    buttons = built.len(),
                    rows = rows.len(),
                    "keyboard built"
                );
                Ok(Keyboard::new(rows, scope))
            }
            Err(e) => {
                if let Some(scope) = scope {
                    self.registry.release(scope);
                }
                Err(e)
            }
        }
    }

    fn encode_all(
        &self,
        scope: Option<KeyboardId>,
        encoding: Encoding,
        buttons: Vec<ButtonSpec<H>>,
    ) -> Result<Vec<Button>, BuildError> {
        let mut built = Vec::with_capacity(buttons.len());
        for spec in buttons {
            let action = match &spec.handler {
                Some(handler) => {
                    let token = match (encoding, scope) {
                        (Encoding::DenseIndex, Some(scope)) => self
                            .registry
                            .register(scope, encoding, handler)
                            .ok_or(BuildError::ScopeEvicted)?,
                        _ => self.registry.register_global(handler),
                    };
                    ButtonAction::Callback(token)
                }
                None => ButtonAction::Inert,
            };
            let button = Button {
                label: spec.label,
                action,
            };
            self.check(&button)?;
            built.push(button);
        }
        Ok(built)
    }

    fn check(&self, button: &Button) -> Result<(), BuildError> {
        let payload = button.callback_data();
        if payload.len() > self.limits.max_token_bytes {
            return Err(BuildError::TokenTooLong {
                label: button.label.clone(),
                len: payload.len(),
                max: self.limits.max_token_bytes,
            });
        }
        let size = button.label.len() + payload.len();
        if size > self.limits.max_button_bytes {
            return Err(BuildError::ButtonTooLarge {
                label: button.label.clone(),
                len: size,
                max: self.limits.max_button_bytes,
            });
        }
        Ok(())
    }
}
