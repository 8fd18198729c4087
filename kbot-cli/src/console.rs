//! Offline mode: a transport that prints to stdout and a source that reads stdin.
//!
//! Each input line becomes a text message from one local chat; `#N` presses button N
//! (1-based) of the last keyboard shown.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use kbot_core::{
    CallbackQuery, Chat, Keyboard, Message, MessageId, Transport, TransportResult, Update, User,
};
use kbot_runtime::ChannelSource;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Chat id used for everything typed into the console.
pub const CONSOLE_CHAT: i64 = 1;

type Shown = Arc<Mutex<Option<(MessageId, Keyboard)>>>;

/// Prints outgoing messages; remembers the last keyboard for `#N` presses.
#[derive(Default)]
pub struct ConsoleTransport {
    next_id: AtomicI32,
    shown: Shown,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&self, message_id: MessageId, keyboard: Option<&Keyboard>) {
        if let Some(kb) = keyboard {
            *lock(&self.shown) = Some((message_id, kb.clone()));
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Text block for one message: the text, then one line per keyboard row.
pub fn render(header: &str, text: &str, keyboard: Option<&Keyboard>) -> String {
    let mut out = format!("{}\n{}", header, text);
    if let Some(kb) = keyboard {
        let mut n = 0;
        for row in kb.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|b| {
                    n += 1;
                    format!("[#{} {}]", n, b.label)
                })
                .collect();
            out.push('\n');
            out.push_str(&cells.join(" "));
        }
    }
    out
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_message(
        &self,
        _chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        println!("{}", render(&format!("--- message {} ---", id), text, keyboard));
        self.remember(id, keyboard);
        Ok(id)
    }

    async fn edit_message(
        &self,
        _chat_id: i64,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<()> {
        println!(
            "{}",
            render(&format!("--- message {} (edited) ---", message_id), text, keyboard)
        );
        self.remember(message_id, keyboard);
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, message_id: MessageId) -> TransportResult<()> {
        println!("--- message {} deleted ---", message_id);
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        notice: Option<&str>,
    ) -> TransportResult<()> {
        if let Some(notice) = notice {
            println!("({})", notice);
        }
        Ok(())
    }
}

fn console_user() -> User {
    User {
        id: CONSOLE_CHAT,
        username: Some("console".to_string()),
        first_name: Some("Console".to_string()),
        last_name: None,
    }
}

fn console_chat() -> Chat {
    Chat {
        id: CONSOLE_CHAT,
        chat_type: "private".to_string(),
    }
}

/// Turns one input line into an update. `None` for blank lines and presses of a button
/// that is not on the last keyboard.
pub fn parse_line(
    line: &str,
    update_id: u32,
    shown: Option<&(MessageId, Keyboard)>,
) -> Option<Update> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(n) = line.strip_prefix('#').and_then(|n| n.parse::<usize>().ok()) {
        let (message_id, keyboard) = shown?;
        let pressed = keyboard.button(n.checked_sub(1)?)?;
        return Some(Update::callback(
            update_id,
            CallbackQuery {
                id: format!("console-{}", update_id),
                from: console_user(),
                chat: Some(console_chat()),
                message_id: Some(*message_id),
                data: Some(pressed.callback_data().to_string()),
            },
        ));
    }
    Some(Update::message(
        update_id,
        Message {
            id: MessageId(0),
            user: console_user(),
            chat: console_chat(),
            text: Some(line.to_string()),
            created_at: Utc::now(),
        },
    ))
}

/// Source fed from stdin lines; ends at end of input.
pub fn stdin_source(transport: &ConsoleTransport) -> ChannelSource {
    let (tx, source) = ChannelSource::new(16);
    let shown = Arc::clone(&transport.shown);
    tokio::spawn(async move {
        let mut update_id: u32 = 0;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            update_id += 1;
            let snapshot = lock(&shown).clone();
            let Some(update) = parse_line(&line, update_id, snapshot.as_ref()) else {
                if line.trim().starts_with('#') {
                    println!("(no such button)");
                }
                continue;
            };
            if tx.send(update).await.is_err() {
                break;
            }
        }
        debug!("console input closed");
    });
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbot_core::{Button, ButtonAction, KeyboardId, UpdateKind};

    fn keyboard() -> Keyboard {
        let b = |label: &str, data: &str| Button {
            label: label.to_string(),
            action: ButtonAction::Callback(data.to_string()),
        };
        Keyboard::new(
            vec![vec![b("A", "d1.0"), b("B", "d1.1")], vec![b("C", "d1.2")]],
            Some(KeyboardId(1)),
        )
    }

    #[test]
    fn test_parse_text_line() {
        let update = parse_line("  hello ", 4, None).unwrap();
        assert_eq!(update.id, 4);
        assert_eq!(update.chat_id(), Some(CONSOLE_CHAT));
        match update.kind {
            UpdateKind::Message(m) => assert_eq!(m.text.as_deref(), Some("hello")),
            other => panic!("expected message, got {other:?}"),
        }
        assert!(parse_line("   ", 5, None).is_none());
    }

    #[test]
    fn test_parse_button_press() {
        let shown = (MessageId(3), keyboard());
        let update = parse_line("#3", 6, Some(&shown)).unwrap();
        match update.kind {
            UpdateKind::CallbackQuery(q) => {
                assert_eq!(q.data.as_deref(), Some("d1.2"));
                assert_eq!(q.message_id, Some(MessageId(3)));
            }
            other => panic!("expected callback, got {other:?}"),
        }
        assert!(parse_line("#0", 7, Some(&shown)).is_none());
        assert!(parse_line("#4", 8, Some(&shown)).is_none());
        assert!(parse_line("#1", 9, None).is_none());
    }

    #[test]
    fn test_render_numbers_buttons_across_rows() {
        let out = render("--- message 1 ---", "Pick", Some(&keyboard()));
        assert_eq!(out, "--- message 1 ---\nPick\n[#1 A] [#2 B]\n[#3 C]");
    }

    #[tokio::test]
    async fn test_transport_remembers_last_keyboard() {
        let transport = ConsoleTransport::new();
        let id = transport
            .send_message(CONSOLE_CHAT, "menu", Some(&keyboard()))
            .await
            .unwrap();
        assert_eq!(id, MessageId(1));
        transport
            .edit_message(CONSOLE_CHAT, id, "plain", None)
            .await
            .unwrap();
        let shown = lock(&transport.shown).clone();
        assert_eq!(shown.map(|(id, kb)| (id, kb.button_count())), Some((MessageId(1), 3)));
    }
}
