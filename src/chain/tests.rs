#![allow(non_snake_case)]

use super::*;
use crate::{
    chain::errors::{
        NetworkSwitchError,
        ProviderError,
        WriteError,
    },
    simulated::{
        SimulatedWallet,
        SwitchBehavior,
    },
};
use std::cell::Cell;

#[test]
fn chain_id__parses_hex_and_decimal() {
    assert_eq!("0x2105".parse::<ChainId>().unwrap(), ChainId::BASE);
    assert_eq!("8453".parse::<ChainId>().unwrap(), ChainId::BASE);
    assert_eq!(ChainId::BASE.to_hex(), "0x2105");
    assert_eq!(ChainId::from_value(&json!(84532)), Some(ChainId::BASE_SEPOLIA));
    assert!("base".parse::<ChainId>().is_err());
}

#[test]
fn normalize_chain_id__hexes_numbers_and_keeps_strings() {
    assert_eq!(normalize_chain_id(&json!(8453)).as_deref(), Some("0x2105"));
    assert_eq!(normalize_chain_id(&json!("0x1")).as_deref(), Some("0x1"));
    assert_eq!(normalize_chain_id(&Value::Null), None);
}

#[test]
fn add_chain_params__carry_canonical_base_parameters() {
    let params = Network::base().add_chain_params();
    assert_eq!(params["chainId"], "0x2105");
    assert_eq!(params["chainName"], "Base");
    assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
    assert_eq!(params["nativeCurrency"]["decimals"], 18);
    assert_eq!(params["rpcUrls"][0], "https://mainnet.base.org");
    assert_eq!(params["blockExplorerUrls"][0], "https://basescan.org");
}

#[test]
fn provider_error__classifies_rejections() {
    assert!(ProviderError::user_rejected().is_user_rejection());
    let named: ProviderError =
        serde_json::from_value(json!({ "code": "ACTION_REJECTED", "message": "nope" })).unwrap();
    assert!(named.is_user_rejection());
    assert!(ProviderError::transport("Request Rejected by wallet").is_user_rejection());
    assert!(!ProviderError::unrecognized_chain(ChainId::BASE).is_user_rejection());
}

#[test]
fn provider_error__classifies_chain_mismatch_by_name_or_message() {
    assert!(ProviderError::chain_mismatch(ChainId::BASE, Some(ChainId(1))).is_chain_mismatch());
    assert!(
        ProviderError::transport("boom")
            .with_short_message("Chain mismatch detected")
            .is_chain_mismatch()
    );
    assert!(!ProviderError::transport("Chain mismatch hidden").with_short_message("other").is_chain_mismatch());
}

#[test]
fn write_error__user_message_prefers_short_message() {
    let err = WriteError::from(ProviderError::transport("long text").with_short_message("short"));
    assert_eq!(err.user_message(), "short");
    let err = WriteError::from(ProviderError::transport(""));
    assert_eq!(err.user_message(), "Transaction failed. Please try again.");
    assert!(WriteError::from(NetworkSwitchError::Unsupported).is_expected());
    assert!(!WriteError::from(NetworkSwitchError::failed("x", None)).is_expected());
}

#[tokio::test]
async fn ensure_chain__when_already_on_chain_then_no_calls_are_made() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId::BASE);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Ok(()));
    assert!(wallet.calls().is_empty());
}

#[tokio::test]
async fn ensure_chain__when_declarative_switch_works_then_provider_is_untouched() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Ok(()));
    assert_eq!(wallet.calls(), vec!["switchChain"]);
    assert_eq!(wallet.current_chain(), ChainId::BASE);
}

#[tokio::test]
async fn ensure_chain__when_user_rejects_then_no_fallback_is_attempted() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.set_session_switch(SwitchBehavior::Reject);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Err(NetworkSwitchError::UserRejected));
    assert_eq!(wallet.calls(), vec!["switchChain"]);
    assert_eq!(wallet.current_chain(), ChainId(1));
}

#[tokio::test]
async fn ensure_chain__when_declarative_switch_fails_then_provider_switches() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.set_session_switch(SwitchBehavior::Fail);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Ok(()));
    assert_eq!(
        wallet.calls(),
        vec![
            "switchChain",
            "eth_chainId",
            "wallet_switchEthereumChain",
            "eth_chainId"
        ]
    );
}

#[tokio::test]
async fn ensure_chain__when_chain_is_unknown_then_adds_it_before_switching() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.forget_chain(ChainId::BASE);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Ok(()));
    assert_eq!(
        wallet.calls(),
        vec![
            "switchChain",
            "eth_chainId",
            "wallet_switchEthereumChain",
            "wallet_addEthereumChain",
            "wallet_switchEthereumChain",
            "eth_chainId"
        ]
    );
    assert_eq!(wallet.current_chain(), ChainId::BASE);
}

#[tokio::test]
async fn ensure_chain__when_adding_is_rejected_then_user_rejected() {
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.forget_chain(ChainId::BASE);
    wallet.reject_add_chain(true);
    let result = ensure_chain(&wallet, &Network::base()).await;
    assert_eq!(result, Err(NetworkSwitchError::UserRejected));
}

#[tokio::test]
async fn ensure_chain__when_no_provider_then_unsupported() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.set_session_switch(SwitchBehavior::Fail);
    wallet.set_provider_available(false);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    assert_eq!(result, Err(NetworkSwitchError::Unsupported));
}

#[tokio::test]
async fn ensure_chain__when_switch_does_not_converge_then_failed() {
    // given
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.set_session_switch(SwitchBehavior::Ignore);
    wallet.set_stuck(true);

    // when
    let result = ensure_chain(&wallet, &Network::base()).await;

    // then
    match result {
        Err(err @ NetworkSwitchError::Failed { .. }) => {
            assert_eq!(err.to_string(), "Provider switch did not reach Base");
            assert!(err.is_retryable());
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn switch_with_provider__when_provider_rejects_then_user_rejected() {
    let wallet = SimulatedWallet::on_chain(ChainId(1));
    wallet.reject_provider_switch(true);
    let result = switch_with_provider(&wallet, &Network::base()).await;
    assert_eq!(result, Err(NetworkSwitchError::UserRejected));
}

#[tokio::test]
async fn with_chain_guard__when_action_succeeds_then_ensure_runs_once() {
    // given
    let ensures = Cell::new(0);
    let actions = Cell::new(0);

    // when
    let result = with_chain_guard(
        async || {
            ensures.set(ensures.get() + 1);
            Ok(())
        },
        async || {
            actions.set(actions.get() + 1);
            Ok::<_, ProviderError>(7)
        },
    )
    .await;

    // then
    assert_eq!(result, Ok(7));
    assert_eq!((ensures.get(), actions.get()), (1, 1));
}

#[tokio::test]
async fn with_chain_guard__when_ensure_fails_then_action_never_runs() {
    let actions = Cell::new(0);
    let result = with_chain_guard(
        async || Err(NetworkSwitchError::UserRejected),
        async || {
            actions.set(actions.get() + 1);
            Ok::<_, ProviderError>(())
        },
    )
    .await;
    assert_eq!(result, Err(WriteError::Network(NetworkSwitchError::UserRejected)));
    assert_eq!(actions.get(), 0);
}

#[tokio::test]
async fn with_chain_guard__when_mismatch_repeats_then_second_error_propagates_unchanged() {
    // given
    let ensures = Cell::new(0);
    let actions = Cell::new(0);
    let second = ProviderError::chain_mismatch(ChainId::BASE, Some(ChainId(10)));

    // when
    let result: Result<(), WriteError> = with_chain_guard(
        async || {
            ensures.set(ensures.get() + 1);
            Ok(())
        },
        async || {
            actions.set(actions.get() + 1);
            if actions.get() == 1 {
                Err(ProviderError::chain_mismatch(ChainId::BASE, Some(ChainId(1))))
            } else {
                Err(second.clone())
            }
        },
    )
    .await;

    // then
    assert_eq!(result, Err(WriteError::Transaction(second.clone())));
    assert_eq!((ensures.get(), actions.get()), (2, 2));
}

#[tokio::test]
async fn with_chain_guard__when_mismatch_then_retry_can_succeed() {
    let actions = Cell::new(0);
    let result = with_chain_guard(
        async || Ok(()),
        async || {
            actions.set(actions.get() + 1);
            if actions.get() == 1 {
                Err(ProviderError::chain_mismatch(ChainId::BASE, None))
            } else {
                Ok("0xhash")
            }
        },
    )
    .await;
    assert_eq!(result, Ok("0xhash"));
    assert_eq!(actions.get(), 2);
}

#[tokio::test]
async fn with_chain_guard__when_error_is_not_a_mismatch_then_no_retry() {
    // given
    let ensures = Cell::new(0);
    let actions = Cell::new(0);

    // when
    let result: Result<(), WriteError> = with_chain_guard(
        async || {
            ensures.set(ensures.get() + 1);
            Ok(())
        },
        async || {
            actions.set(actions.get() + 1);
            Err(ProviderError::new(-32000, "insufficient funds"))
        },
    )
    .await;

    // then
    assert!(matches!(result, Err(WriteError::Transaction(ref e)) if e.message == "insufficient funds"));
    assert_eq!((ensures.get(), actions.get()), (1, 1));
}
