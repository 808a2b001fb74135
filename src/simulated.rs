use crate::{
    chain::{
        ChainId,
        errors::ProviderError,
    },
    contracts::ReceiptStatus,
    wallets::{
        Eip1193Provider,
        WalletEnvironment,
        WalletEvent,
        WalletSession,
    },
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::broadcast;
use tracing::debug;

pub const SIMULATED_ACCOUNT: &str = "0x00000000000000000000000000000000000a11ce";
const METHOD_NOT_FOUND: i64 = -32601;

/// How the declarative `switch_chain` of the simulated session answers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SwitchBehavior {
    /// Switches when the chain is known, otherwise reports it unrecognized.
    #[default]
    Switch,
    Reject,
    /// Errors without a rejection, so callers fall back to the raw provider.
    Fail,
    /// Returns success but leaves the chain where it was.
    Ignore,
}

#[derive(Debug)]
struct SimState {
    environment: WalletEnvironment,
    chain: ChainId,
    accounts: Vec<String>,
    known_chains: HashSet<ChainId>,
    session_switch: SwitchBehavior,
    provider_available: bool,
    reject_provider_switch: bool,
    reject_add_chain: bool,
    stuck: bool,
    flip_on_next_send: Option<ChainId>,
    fail_next_send: Option<ProviderError>,
    revert_next: bool,
    receipts: HashMap<String, ReceiptStatus>,
    sent: Vec<Value>,
    calls: Vec<String>,
}

/// In-process wallet and chain. Acts as both the session and its raw provider.
#[derive(Clone, Debug)]
pub struct SimulatedWallet {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<WalletEvent>,
}

impl Default for SimulatedWallet {
    fn default() -> Self {
        Self::on_chain(ChainId::BASE)
    }
}

impl SimulatedWallet {
    pub fn on_chain(chain: ChainId) -> Self {
        let (events, _) = broadcast::channel(16);
        let state = SimState {
            environment: WalletEnvironment::Injected,
            chain,
            accounts: vec![SIMULATED_ACCOUNT.to_string()],
            known_chains: [ChainId(1), ChainId::BASE, ChainId::BASE_SEPOLIA, chain]
                .into_iter()
                .collect(),
            session_switch: SwitchBehavior::default(),
            provider_available: true,
            reject_provider_switch: false,
            reject_add_chain: false,
            stuck: false,
            flip_on_next_send: None,
            fail_next_send: None,
            revert_next: false,
            receipts: HashMap::new(),
            sent: Vec::new(),
            calls: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_environment(self, environment: WalletEnvironment) -> Self {
        self.lock().environment = environment;
        self
    }

    pub fn set_chain(&self, chain: ChainId) {
        let changed = {
            let mut state = self.lock();
            let changed = state.chain != chain;
            state.chain = chain;
            state.known_chains.insert(chain);
            changed
        };
        if changed {
            let _ = self.events.send(WalletEvent::ChainChanged(chain));
        }
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        let event = if accounts.is_empty() {
            WalletEvent::Disconnected
        } else {
            WalletEvent::AccountsChanged(accounts.clone())
        };
        self.lock().accounts = accounts;
        let _ = self.events.send(event);
    }

    pub fn set_session_switch(&self, behavior: SwitchBehavior) {
        self.lock().session_switch = behavior;
    }

    pub fn set_provider_available(&self, available: bool) {
        self.lock().provider_available = available;
    }

    pub fn reject_provider_switch(&self, reject: bool) {
        self.lock().reject_provider_switch = reject;
    }

    pub fn reject_add_chain(&self, reject: bool) {
        self.lock().reject_add_chain = reject;
    }

    pub fn forget_chain(&self, chain: ChainId) {
        self.lock().known_chains.remove(&chain);
    }

    /// Provider switches report success without moving the chain.
    pub fn set_stuck(&self, stuck: bool) {
        self.lock().stuck = stuck;
    }

    /// The next `eth_sendTransaction` first moves the wallet to `chain`.
    pub fn flip_chain_on_next_send(&self, chain: ChainId) {
        self.lock().flip_on_next_send = Some(chain);
    }

    pub fn fail_next_send(&self, error: ProviderError) {
        self.lock().fail_next_send = Some(error);
    }

    pub fn revert_next_transaction(&self) {
        self.lock().revert_next = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn sent_transactions(&self) -> Vec<Value> {
        self.lock().sent.clone()
    }

    pub fn current_chain(&self) -> ChainId {
        self.lock().chain
    }

    fn requested_chain(params: &Value) -> Result<ChainId, ProviderError> {
        params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(ChainId::from_value)
            .ok_or_else(|| ProviderError::new(-32602, "Missing or invalid chainId"))
    }

    fn send_transaction(&self, params: &Value) -> Result<Value, ProviderError> {
        let flipped = {
            let mut state = self.lock();
            if let Some(err) = state.fail_next_send.take() {
                return Err(err);
            }
            state.flip_on_next_send.take()
        };
        if let Some(chain) = flipped {
            debug!(%chain, "simulated wallet changed chain mid-flight");
            self.set_chain(chain);
        }

        let mut state = self.lock();
        let tx = params.get(0).cloned().unwrap_or(Value::Null);
        let target = tx.get("chainId").and_then(ChainId::from_value);
        if let Some(target) = target.filter(|t| *t != state.chain) {
            return Err(ProviderError::chain_mismatch(target, Some(state.chain)));
        }
        let hash = format!("0x{:064x}", state.sent.len() + 1);
        let status = if std::mem::take(&mut state.revert_next) {
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Success
        };
        state.receipts.insert(hash.clone(), status);
        state.sent.push(tx);
        Ok(Value::String(hash))
    }
}

impl Eip1193Provider for SimulatedWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.lock().calls.push(method.to_string());
        match method {
            "eth_chainId" => Ok(Value::String(self.current_chain().to_hex())),
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(self.lock().accounts)),
            "wallet_switchEthereumChain" => {
                let chain = Self::requested_chain(&params)?;
                {
                    let state = self.lock();
                    if state.reject_provider_switch {
                        return Err(ProviderError::user_rejected());
                    }
                    if !state.known_chains.contains(&chain) {
                        return Err(ProviderError::unrecognized_chain(chain));
                    }
                    if state.stuck {
                        return Ok(Value::Null);
                    }
                }
                self.set_chain(chain);
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain = Self::requested_chain(&params)?;
                let mut state = self.lock();
                if state.reject_add_chain {
                    return Err(ProviderError::user_rejected());
                }
                state.known_chains.insert(chain);
                Ok(Value::Null)
            }
            "eth_sendTransaction" => self.send_transaction(&params),
            "eth_getTransactionReceipt" => {
                let hash = params.get(0).and_then(Value::as_str).unwrap_or_default();
                Ok(match self.lock().receipts.get(hash) {
                    Some(ReceiptStatus::Success) => json!({ "transactionHash": hash, "status": "0x1" }),
                    Some(ReceiptStatus::Reverted) => json!({ "transactionHash": hash, "status": "0x0" }),
                    None => Value::Null,
                })
            }
            other => Err(ProviderError::new(
                METHOD_NOT_FOUND,
                format!("Method {other} not supported"),
            )),
        }
    }
}

impl WalletSession for SimulatedWallet {
    type Provider = SimulatedWallet;

    fn environment(&self) -> WalletEnvironment {
        self.lock().environment
    }

    fn chain_id(&self) -> Option<ChainId> {
        Some(self.lock().chain)
    }

    fn account(&self) -> Option<String> {
        self.lock().accounts.first().cloned()
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<(), ProviderError> {
        let behavior = {
            let mut state = self.lock();
            state.calls.push("switchChain".to_string());
            if state.session_switch == SwitchBehavior::Switch
                && !state.known_chains.contains(&chain)
            {
                return Err(ProviderError::unrecognized_chain(chain));
            }
            state.session_switch
        };
        match behavior {
            SwitchBehavior::Switch => {
                self.set_chain(chain);
                Ok(())
            }
            SwitchBehavior::Reject => Err(ProviderError::user_rejected()),
            SwitchBehavior::Fail => Err(ProviderError::transport(
                "Connector does not support programmatic chain switching",
            )),
            SwitchBehavior::Ignore => Ok(()),
        }
    }

    async fn connector_provider(&self) -> Option<SimulatedWallet> {
        self.lock().provider_available.then(|| self.clone())
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[tokio::test]
    async fn sut__when_chain_is_set_then_subscribers_see_the_change() {
        // given
        let wallet = SimulatedWallet::on_chain(ChainId(1));
        let mut events = wallet.subscribe();

        // when
        wallet.set_chain(ChainId::BASE);
        wallet.set_chain(ChainId::BASE);

        // then
        assert_eq!(
            events.recv().await.unwrap(),
            WalletEvent::ChainChanged(ChainId::BASE)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn sut__when_transaction_targets_another_chain_then_reports_mismatch() {
        // given
        let wallet = SimulatedWallet::on_chain(ChainId::BASE);
        wallet.flip_chain_on_next_send(ChainId(1));

        // when
        let result = wallet
            .request(
                "eth_sendTransaction",
                json!([{ "to": "0x00", "chainId": "0x2105" }]),
            )
            .await;

        // then
        assert!(result.unwrap_err().is_chain_mismatch());
        assert_eq!(wallet.current_chain(), ChainId(1));
        assert!(wallet.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn sut__unknown_methods_are_not_found() {
        let wallet = SimulatedWallet::default();
        let err = wallet.request("eth_sign", json!([])).await.unwrap_err();
        assert_eq!(err.numeric_code(), Some(METHOD_NOT_FOUND));
    }
}
