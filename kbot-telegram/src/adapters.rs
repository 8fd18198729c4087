//! Adapters between Telegram (teloxide) types and kbot_core types.
//! Depends only on teloxide and kbot_core type definitions.

use kbot_core::{CallbackQuery, Chat, Keyboard, Message, MessageId, Update, UpdateKind, User};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Wraps a teloxide User for conversion to core [`User`].
pub struct TelegramUserWrapper<'a>(pub &'a teloxide::types::User);

impl TelegramUserWrapper<'_> {
    pub fn to_core(&self) -> User {
        User {
            id: self.0.id.0 as i64,
            username: self.0.username.clone(),
            first_name: Some(self.0.first_name.clone()),
            last_name: self.0.last_name.clone(),
        }
    }
}

/// Wraps a teloxide Chat for conversion to core [`Chat`].
pub struct TelegramChatWrapper<'a>(pub &'a teloxide::types::Chat);

impl TelegramChatWrapper<'_> {
    pub fn to_core(&self) -> Chat {
        let chat = self.0;
        let chat_type = if chat.is_private() {
            "private"
        } else if chat.is_supergroup() {
            "supergroup"
        } else if chat.is_group() {
            "group"
        } else {
            "channel"
        };
        Chat {
            id: chat.id.0,
            chat_type: chat_type.to_string(),
        }
    }
}

/// Wraps a teloxide Message for conversion to core [`Message`].
pub struct TelegramMessageWrapper<'a>(pub &'a teloxide::types::Message);

impl TelegramMessageWrapper<'_> {
    pub fn to_core(&self) -> Message {
        Message {
            id: MessageId(self.0.id.0),
            user: self
                .0
                .from
                .as_ref()
                .map(|u| TelegramUserWrapper(u).to_core())
                .unwrap_or_else(User::anonymous),
            chat: TelegramChatWrapper(&self.0.chat).to_core(),
            text: self.0.text().map(str::to_string),
            created_at: self.0.date,
        }
    }
}

/// Wraps a teloxide Update for conversion to core [`Update`].
pub struct TelegramUpdateWrapper<'a>(pub &'a teloxide::types::Update);

impl TelegramUpdateWrapper<'_> {
    pub fn to_core(&self) -> Update {
        use teloxide::types::UpdateKind as Kind;

        let kind = match &self.0.kind {
            Kind::Message(m) => UpdateKind::Message(TelegramMessageWrapper(m).to_core()),
            Kind::CallbackQuery(q) => UpdateKind::CallbackQuery(CallbackQuery {
                id: q.id.to_string(),
                from: TelegramUserWrapper(&q.from).to_core(),
                chat: q
                    .message
                    .as_ref()
                    .map(|m| TelegramChatWrapper(m.chat()).to_core()),
                message_id: q.message.as_ref().map(|m| MessageId(m.id().0)),
                data: q.data.clone(),
            }),
            Kind::EditedMessage(_) => UpdateKind::Other("edited_message".to_string()),
            Kind::ChannelPost(_) => UpdateKind::Other("channel_post".to_string()),
            Kind::InlineQuery(_) => UpdateKind::Other("inline_query".to_string()),
            _ => UpdateKind::Other("unsupported".to_string()),
        };
        Update {
            id: self.0.id.0,
            kind,
        }
    }
}

/// Inline keyboard markup for a core [`Keyboard`]; inert buttons carry the no-op payload.
pub fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data().to_string()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbot_core::{Button, ButtonAction, KeyboardId, NOOP_CALLBACK};
    use teloxide::types::InlineKeyboardButtonKind;

    fn parse(json: serde_json::Value) -> teloxide::types::Update {
        serde_json::from_value(json).unwrap()
    }

    /// **Test: TelegramUserWrapper converts teloxide User to core User with correct id, username, first_name, last_name.**
    #[test]
    fn test_telegram_user_wrapper_to_core() {
        let user = teloxide::types::User {
            id: teloxide::types::UserId(123),
            is_bot: false,
            first_name: "Test".to_string(),
            last_name: Some("User".to_string()),
            username: Some("testuser".to_string()),
            language_code: Some("en".to_string()),
            is_premium: false,
            added_to_attachment_menu: false,
        };

        let core_user = TelegramUserWrapper(&user).to_core();

        assert_eq!(core_user.id, 123);
        assert_eq!(core_user.username, Some("testuser".to_string()));
        assert_eq!(core_user.first_name, Some("Test".to_string()));
        assert_eq!(core_user.last_name, Some("User".to_string()));
    }

    /// **Test: a text message update keeps update id, chat, sender and text.**
    #[test]
    fn test_message_update_to_core() {
        let update = parse(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1_700_000_000,
                "chat": {"id": 456, "type": "private", "first_name": "Test"},
                "from": {"id": 456, "is_bot": false, "first_name": "Test"},
                "text": "/start"
            }
        }));

        let core = TelegramUpdateWrapper(&update).to_core();

        assert_eq!(core.id, 10);
        assert_eq!(core.chat_id(), Some(456));
        match core.kind {
            UpdateKind::Message(m) => {
                assert_eq!(m.id, MessageId(5));
                assert_eq!(m.text.as_deref(), Some("/start"));
                assert_eq!(m.chat.chat_type, "private");
                assert_eq!(m.user.id, 456);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    /// **Test: a button press carries callback id, data, chat and the keyboard's message.**
    #[test]
    fn test_callback_update_to_core() {
        let update = parse(serde_json::json!({
            "update_id": 11,
            "callback_query": {
                "id": "4382",
                "from": {"id": 456, "is_bot": false, "first_name": "Test"},
                "message": {
                    "message_id": 5,
                    "date": 1_700_000_000,
                    "chat": {"id": 456, "type": "private", "first_name": "Test"},
                    "text": "menu"
                },
                "chat_instance": "-1",
                "data": "d1.1"
            }
        }));

        match TelegramUpdateWrapper(&update).to_core().kind {
            UpdateKind::CallbackQuery(q) => {
                assert_eq!(q.id, "4382");
                assert_eq!(q.data.as_deref(), Some("d1.1"));
                assert_eq!(q.chat.map(|c| c.id), Some(456));
                assert_eq!(q.message_id, Some(MessageId(5)));
            }
            other => panic!("expected callback, got {other:?}"),
        }
    }

    /// **Test: markup keeps the grid; inert buttons get the no-op payload.**
    #[test]
    fn test_to_markup() {
        let keyboard = Keyboard::new(
            vec![
                vec![
                    Button {
                        label: "A".to_string(),
                        action: ButtonAction::Callback("d1.0".to_string()),
                    },
                    Button {
                        label: "B".to_string(),
                        action: ButtonAction::Callback("d1.1".to_string()),
                    },
                ],
                vec![Button {
                    label: "Title".to_string(),
                    action: ButtonAction::Inert,
                }],
            ],
            Some(KeyboardId(1)),
        );

        let markup = to_markup(&keyboard);

        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Title");
        match &markup.inline_keyboard[1][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => assert_eq!(data, NOOP_CALLBACK),
            other => panic!("unexpected button kind {other:?}"),
        }
    }
}
