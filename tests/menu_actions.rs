#![allow(non_snake_case)]
use higher_lower::{
    ChainId,
    contracts::{
        MenuAction,
        ReceiptStatus,
        WIN_CONTRACT,
    },
    simulated::SwitchBehavior,
    test_helpers::*,
};

#[tokio::test]
async fn menu_action__when_confirmed_then_receipt_settles_the_status() {
    // given
    let mut ctx = TestContext::new();

    // when
    let submitted = ctx.controller().menu_action(MenuAction::Win).await;
    let receipt = ctx.controller().poll_menu_receipt().await;

    // then
    assert!(submitted);
    assert_eq!(receipt, Some(ReceiptStatus::Success));
    let menu = ctx.controller().menu().clone();
    assert_eq!(menu.message.as_deref(), Some("Confirmed on Base."));
    assert_eq!(menu.error, None);
    assert!(menu.settled);
    let sent = ctx.wallet().sent_transactions();
    assert_eq!(sent[0]["to"], WIN_CONTRACT.to_string());
    assert_eq!(sent[0]["value"], "0xe8d4a51000");
    let url = ctx.controller().snapshot().menu_tx_url.expect("explorer link");
    assert!(url.starts_with("https://basescan.org/tx/0x"));
}

#[tokio::test]
async fn menu_action__when_settled_then_polling_stops() {
    let mut ctx = TestContext::new();
    assert!(ctx.controller().menu_action(MenuAction::Draw).await);
    ctx.controller().poll_menu_receipt().await;
    ctx.wallet().clear_calls();

    assert_eq!(ctx.controller().poll_menu_receipt().await, None);
    assert!(ctx.wallet().calls().is_empty());
}

#[tokio::test]
async fn menu_action__when_transaction_reverts_then_error_is_shown() {
    // given
    let mut ctx = TestContext::new();
    ctx.wallet().revert_next_transaction();

    // when
    ctx.controller().menu_action(MenuAction::Lose).await;
    let receipt = ctx.controller().poll_menu_receipt().await;

    // then
    assert_eq!(receipt, Some(ReceiptStatus::Reverted));
    assert_eq!(
        ctx.controller().menu().error.as_deref(),
        Some("Transaction reverted.")
    );
}

#[tokio::test]
async fn menu_action__when_no_account_then_asks_to_connect() {
    // given
    let mut ctx = TestContext::new();
    ctx.wallet().set_accounts(Vec::new());

    // when
    let submitted = ctx.controller().menu_action(MenuAction::Win).await;

    // then
    assert!(!submitted);
    assert_eq!(
        ctx.controller().menu().error.as_deref(),
        Some("Connect your wallet to continue.")
    );
    assert!(ctx.wallet().calls().is_empty());
}

#[tokio::test]
async fn menu_action__when_off_chain_and_switch_rejected_then_nothing_is_sent() {
    // given
    let mut ctx = TestContext::on_chain(ChainId(1));
    ctx.wallet().set_session_switch(SwitchBehavior::Reject);

    // when
    let submitted = ctx.controller().menu_action(MenuAction::Win).await;

    // then
    assert!(!submitted);
    assert_eq!(
        ctx.controller().menu().error.as_deref(),
        Some("Please switch to Base to continue.")
    );
    assert!(ctx.wallet().sent_transactions().is_empty());
}

#[tokio::test]
async fn menu_action__when_off_chain_then_switches_and_submits() {
    // given
    let mut ctx = TestContext::on_chain(ChainId(1));

    // when
    let submitted = ctx.controller().menu_action(MenuAction::Draw).await;

    // then
    assert!(submitted);
    assert_eq!(ctx.wallet().current_chain(), ChainId::BASE);
    assert_eq!(
        ctx.controller().menu().message.as_deref(),
        Some("Submitted to Base.")
    );
}
