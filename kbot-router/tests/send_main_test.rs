//! Integration tests for [`kbot_router::Context::send_main`].
//!
//! Covers: NoChange with and without a main message, New and Existing targets, the
//! not-editable fallback, not-modified as success, deletion of superseded main messages
//! and release of superseded keyboards.

mod common;

use std::sync::{Arc, Mutex};

use common::{dispatcher, main_text, CHAT};
use kbot_core::testing::{callback_update, text_update, TransportCall};
use kbot_core::{MessageId, MessageTarget, TransportError};
use kbot_router::{button, handler_fn, DispatchOutcome, Encoding};
use tokio_util::sync::CancellationToken;

/// **Test: NoChange with no main message sends a new one and records it.**
///
/// **Setup:** fresh chat; `/start` calls `send_main(NoChange, ..)`.
/// **Expected:** one send, no edit; stored main message is the sent id.
#[tokio::test]
async fn test_no_change_without_main_sends() {
    let (transport, d) = dispatcher();
    let d = d.command("/start", main_text(MessageTarget::NoChange, "menu"));

    let outcome = d
        .dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(transport.sends().len(), 1);
    assert!(transport.edits().is_empty());
    let state = d.store().get(CHAT).await.unwrap();
    assert_eq!(state.main_message, Some(MessageId(1)));
}

/// **Test: NoChange with a main message edits it in place.**
#[tokio::test]
async fn test_no_change_with_main_edits() {
    let (transport, d) = dispatcher();
    let d = d.command("/start", main_text(MessageTarget::NoChange, "menu"));

    d.dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;
    d.dispatch(text_update(2, CHAT, "/start"), CancellationToken::new())
        .await;

    assert_eq!(transport.sends().len(), 1);
    let edits = transport.edits();
    assert_eq!(edits.len(), 1);
    assert!(matches!(
        &edits[0],
        TransportCall::Edit { message_id: MessageId(1), result: Ok(()), .. }
    ));
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(1))
    );
}

/// **Test: an edit refused as not editable falls back to exactly one new send.**
///
/// **Setup:** main message 1 exists; the transport fails the next edit with NotEditable.
/// **Expected:** one failed edit of 1, one new send (id 2); stored main message is 2.
#[tokio::test]
async fn test_not_editable_falls_back_to_send() {
    let (transport, d) = dispatcher();
    let d = d.command("/start", main_text(MessageTarget::NoChange, "menu"));
    d.dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;

    transport.fail_next_edit(TransportError::NotEditable);
    let outcome = d
        .dispatch(text_update(2, CHAT, "/start"), CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    let edits = transport.edits();
    assert_eq!(edits.len(), 1);
    assert!(matches!(
        &edits[0],
        TransportCall::Edit {
            message_id: MessageId(1),
            result: Err(TransportError::NotEditable),
            ..
        }
    ));
    assert_eq!(transport.sends().len(), 2);
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(2))
    );
}

/// **Test: an unchanged edit counts as success and sends nothing.**
#[tokio::test]
async fn test_not_modified_is_success() {
    let (transport, d) = dispatcher();
    let d = d.command("/start", main_text(MessageTarget::NoChange, "menu"));
    d.dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;

    transport.fail_next_edit(TransportError::NotModified);
    let outcome = d
        .dispatch(text_update(2, CHAT, "/start"), CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(transport.sends().len(), 1);
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(1))
    );
}

/// **Test: other edit failures reach the error hook and leave the state alone.**
#[tokio::test]
async fn test_edit_failure_is_reported() {
    let (transport, d) = dispatcher();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    let d = d
        .command("/start", main_text(MessageTarget::NoChange, "menu"))
        .on_error(move |_, e| seen.lock().unwrap().push(e.to_string()));
    d.dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;

    transport.fail_next_edit(TransportError::ChatBlocked);
    let outcome = d
        .dispatch(text_update(2, CHAT, "/start"), CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Failed);
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert_eq!(transport.sends().len(), 1);
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(1))
    );
}

/// **Test: New always sends; Existing edits the given message and makes it main.**
#[tokio::test]
async fn test_new_and_existing_targets() {
    let (transport, d) = dispatcher();
    let d = d
        .command("/start", main_text(MessageTarget::NoChange, "menu"))
        .command("/fresh", main_text(MessageTarget::New, "fresh"))
        .command("/first", main_text(MessageTarget::Existing(MessageId(1)), "first"));

    d.dispatch(text_update(1, CHAT, "/start"), CancellationToken::new())
        .await;
    d.dispatch(text_update(2, CHAT, "/fresh"), CancellationToken::new())
        .await;
    assert_eq!(transport.sends().len(), 2);
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(2))
    );

    d.dispatch(text_update(3, CHAT, "/first"), CancellationToken::new())
        .await;
    assert_eq!(transport.sends().len(), 2);
    assert!(matches!(
        transport.edits().last(),
        Some(TransportCall::Edit { message_id: MessageId(1), .. })
    ));
    assert_eq!(
        d.store().get(CHAT).await.unwrap().main_message,
        Some(MessageId(1))
    );
}

/// **Test: with deletion on, a replaced main message is deleted.**
#[tokio::test]
async fn test_delete_superseded_main_message() {
    let (transport, d) = dispatcher();
    let d = d
        .command("/fresh", main_text(MessageTarget::New, "fresh"))
        .delete_messages(true);

    d.dispatch(text_update(1, CHAT, "/fresh"), CancellationToken::new())
        .await;
    assert!(transport.deletes().is_empty());
    d.dispatch(text_update(2, CHAT, "/fresh"), CancellationToken::new())
        .await;

    assert_eq!(
        transport.deletes(),
        vec![TransportCall::Delete {
            chat_id: CHAT,
            message_id: MessageId(1)
        }]
    );
}

/// **Test: a button from a superseded keyboard is stale.**
///
/// **Setup:** `/menu` builds a dense keyboard each time; run it twice.
/// **Action:** press a button of the first keyboard.
/// **Expected:** one acknowledgment with a notice, the button handler never runs; the
/// current keyboard's button still works.
#[tokio::test]
async fn test_superseded_keyboard_goes_stale() {
    let (transport, d) = dispatcher();
    let (count, pressed) = common::counting();
    let menu = handler_fn(move |mut ctx| {
        let pressed = Arc::clone(&pressed);
        async move {
            let kb = ctx.keyboard(1, Encoding::DenseIndex, vec![button("Press", &pressed)])?;
            ctx.send_main(MessageTarget::NoChange, "menu", Some(kb))
                .await?;
            Ok(())
        }
    });
    let d = d.command("/menu", menu);

    d.dispatch(text_update(1, CHAT, "/menu"), CancellationToken::new())
        .await;
    let old = transport.last_keyboard().unwrap();
    d.dispatch(text_update(2, CHAT, "/menu"), CancellationToken::new())
        .await;
    let current = transport.last_keyboard().unwrap();
    assert_eq!(d.registry().live_scopes(), 1);

    let stale = d
        .dispatch(
            callback_update(3, CHAT, MessageId(1), old.button(0).unwrap().callback_data()),
            CancellationToken::new(),
        )
        .await;
    assert_eq!(stale, DispatchOutcome::Stale);
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(transport.answers().len(), 1);

    let fresh = d
        .dispatch(
            callback_update(4, CHAT, MessageId(1), current.button(0).unwrap().callback_data()),
            CancellationToken::new(),
        )
        .await;
    assert_eq!(fresh, DispatchOutcome::Handled);
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(transport.answers().len(), 2);
}
