//! Demo bot: a six-option menu in one main message that is edited in place.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use kbot_core::{MessageTarget, Result};
use kbot_router::{button, handler_fn, Context, Dispatcher, Encoding, Handler, HandlerRef};
use tracing::info;

const OPTIONS: usize = 6;
const COLUMNS: usize = 3;

struct Menu {
    options: Vec<HandlerRef>,
}

#[async_trait]
impl Handler for Menu {
    async fn handle(&self, mut ctx: Context) -> Result<()> {
        let buttons = self
            .options
            .iter()
            .enumerate()
            .map(|(i, h)| button(format!("Option {}", i + 1), h))
            .collect();
        let keyboard = ctx.keyboard(COLUMNS, Encoding::DenseIndex, buttons)?;
        ctx.send_main(MessageTarget::NoChange, "Pick one", Some(keyboard))
            .await?;
        Ok(())
    }
}

struct Pick {
    number: usize,
    menu: Weak<Menu>,
}

#[async_trait]
impl Handler for Pick {
    async fn handle(&self, mut ctx: Context) -> Result<()> {
        info!(chat_id = ctx.chat_id(), option = self.number, "option picked");
        let keyboard = match self.menu.upgrade() {
            Some(menu) => {
                let menu: HandlerRef = menu;
                Some(ctx.keyboard(1, Encoding::DenseIndex, vec![button("Back", &menu)])?)
            }
            None => None,
        };
        let text = format!("You picked option {}", self.number);
        ctx.send_main(MessageTarget::NoChange, &text, keyboard).await?;
        ctx.answer(Some(text.as_str())).await?;
        Ok(())
    }
}

/// The `/start` handler: shows the menu as the chat's main message.
pub fn menu() -> HandlerRef {
    Arc::new_cyclic(|weak: &Weak<Menu>| Menu {
        options: (1..=OPTIONS)
            .map(|number| {
                Arc::new(Pick {
                    number,
                    menu: weak.clone(),
                }) as HandlerRef
            })
            .collect(),
    })
}

/// Adds the demo's commands besides `/start`.
pub fn routes(dispatcher: Dispatcher) -> Dispatcher {
    let help = handler_fn(|ctx| async move {
        ctx.send(
            "/start or /menu shows the menu; press a button to pick an option.",
            None,
        )
        .await?;
        Ok(())
    });
    let echo = handler_fn(|ctx| async move {
        let reply = format!("You said: {}", ctx.text().unwrap_or_default());
        ctx.send(&reply, None).await?;
        Ok(())
    });
    dispatcher
        .command("/menu", menu())
        .command("/help", help)
        .on_text(echo)
}
