use crate::{
    chain::{
        ChainId,
        errors::ProviderError,
        normalize_chain_id,
    },
    scores::{
        CONNECTOR_KEY,
        ScoreStore,
    },
};
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};
use tokio::sync::broadcast;
use tracing::{
    debug,
    info,
};

const EVENT_CAPACITY: usize = 16;

/// Raw JSON-RPC passthrough to a wallet.
pub trait Eip1193Provider {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, ProviderError>>;
}

/// Connected wallet session: the declarative layer over a provider.
pub trait WalletSession {
    type Provider: Eip1193Provider;

    fn environment(&self) -> WalletEnvironment;

    /// Last chain the wallet reported, if any.
    fn chain_id(&self) -> Option<ChainId>;

    fn account(&self) -> Option<String>;

    fn switch_chain(
        &self,
        chain: ChainId,
    ) -> impl Future<Output = Result<(), ProviderError>>;

    /// A usable provider handle, or `None` when the wallet exposes none.
    fn connector_provider(&self) -> impl Future<Output = Option<Self::Provider>>;

    /// Re-reads accounts and chain, emitting events for anything that changed.
    fn refresh(&self) -> impl Future<Output = Result<(), ProviderError>>;

    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(ChainId),
    Disconnected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WalletEnvironment {
    /// Provider handed over by an embedding mini-app host.
    MiniApp,
    /// Generic wallet exposing its provider directly.
    Injected,
    None,
}

impl WalletEnvironment {
    pub fn connector_key(self) -> Option<&'static str> {
        match self {
            WalletEnvironment::MiniApp => Some("mini-app"),
            WalletEnvironment::Injected => Some("injected"),
            WalletEnvironment::None => None,
        }
    }

    pub fn from_connector_key(key: &str) -> Option<Self> {
        match key {
            "mini-app" => Some(WalletEnvironment::MiniApp),
            "injected" => Some(WalletEnvironment::Injected),
            _ => None,
        }
    }
}

impl fmt::Display for WalletEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletEnvironment::MiniApp => "Mini App",
            WalletEnvironment::Injected => "Injected",
            WalletEnvironment::None => "None",
        };
        write!(f, "{name}")
    }
}

/// Mini-app host first, then an injected wallet.
pub fn detect_environment(
    mini_app_url: Option<&str>,
    injected_url: Option<&str>,
) -> (WalletEnvironment, Option<String>) {
    if let Some(url) = mini_app_url {
        return (WalletEnvironment::MiniApp, Some(url.to_string()));
    }
    if let Some(url) = injected_url {
        return (WalletEnvironment::Injected, Some(url.to_string()));
    }
    (WalletEnvironment::None, None)
}

pub fn persist_connector<S: ScoreStore>(store: &mut S, environment: WalletEnvironment) {
    match environment.connector_key() {
        Some(key) => store.set(CONNECTOR_KEY, key),
        None => store.remove(CONNECTOR_KEY),
    }
}

pub fn persisted_connector<S: ScoreStore>(store: &S) -> Option<WalletEnvironment> {
    store
        .get(CONNECTOR_KEY)
        .and_then(|key| WalletEnvironment::from_connector_key(&key))
}

/// A successful connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletState {
    pub address: String,
    pub chain_id: Option<String>,
    pub connector: WalletEnvironment,
}

/// Asks the provider for accounts and chain, then remembers which connector worked.
pub async fn connect<P: Eip1193Provider, S: ScoreStore>(
    provider: &P,
    environment: WalletEnvironment,
    request_accounts: bool,
    store: &mut S,
) -> Result<WalletState, ProviderError> {
    let method = if request_accounts {
        "eth_requestAccounts"
    } else {
        "eth_accounts"
    };
    let accounts = parse_accounts(&provider.request(method, json!([])).await?);
    let Some(address) = accounts.first().cloned() else {
        return Err(ProviderError::transport("No accounts returned from provider"));
    };
    let chain = provider.request("eth_chainId", json!([])).await?;

    persist_connector(store, environment);
    info!(%address, %environment, "wallet connected");

    Ok(WalletState {
        address,
        chain_id: normalize_chain_id(&chain),
        connector: environment,
    })
}

pub(crate) fn parse_accounts(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

/// EIP-1193 provider reached over HTTP JSON-RPC.
#[derive(Clone, Debug)]
pub struct JsonRpcProvider {
    url: String,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, ProviderError> {
        let url = url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build().map_err(|e| {
            ProviderError::transport(format!("failed to build HTTP client for wallet: {e}"))
        })?;
        Ok(Self {
            url,
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Eip1193Provider for JsonRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "wallet request");
        let res = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("wallet request failed: {e}")))?;
        let envelope: RpcResponse = res.json().await.map_err(|e| {
            ProviderError::transport(format!("failed to read wallet response body: {e}"))
        })?;
        match envelope {
            RpcResponse {
                error: Some(err), ..
            } => Err(err),
            RpcResponse { result, .. } => Ok(result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct CachedWallet {
    accounts: Vec<String>,
    chain: Option<ChainId>,
}

/// Wallet session over a JSON-RPC provider, for both the mini-app host and injected
/// environments.
#[derive(Clone, Debug)]
pub struct RpcWallet {
    environment: WalletEnvironment,
    provider: Option<JsonRpcProvider>,
    cached: Arc<Mutex<CachedWallet>>,
    events: broadcast::Sender<WalletEvent>,
}

impl RpcWallet {
    pub fn new(environment: WalletEnvironment, provider: Option<JsonRpcProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            environment,
            provider,
            cached: Arc::new(Mutex::new(CachedWallet::default())),
            events,
        }
    }

    pub fn from_urls(
        mini_app_url: Option<&str>,
        injected_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let (environment, url) = detect_environment(mini_app_url, injected_url);
        let provider = url.map(JsonRpcProvider::new).transpose()?;
        Ok(Self::new(environment, provider))
    }

    fn apply(&self, accounts: Vec<String>, chain: Option<ChainId>) {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.accounts != accounts {
            let _ = self.events.send(if accounts.is_empty() {
                WalletEvent::Disconnected
            } else {
                WalletEvent::AccountsChanged(accounts.clone())
            });
            cached.accounts = accounts;
        }
        if cached.chain != chain {
            if let Some(id) = chain {
                let _ = self.events.send(WalletEvent::ChainChanged(id));
            }
            cached.chain = chain;
        }
    }

    async fn read_chain(provider: &JsonRpcProvider) -> Option<ChainId> {
        provider
            .request("eth_chainId", json!([]))
            .await
            .ok()
            .and_then(|v| ChainId::from_value(&v))
    }
}

impl WalletSession for RpcWallet {
    type Provider = JsonRpcProvider;

    fn environment(&self) -> WalletEnvironment {
        self.environment
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .chain
    }

    fn account(&self) -> Option<String> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts
            .first()
            .cloned()
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<(), ProviderError> {
        let Some(provider) = &self.provider else {
            return Err(ProviderError::disconnected());
        };
        provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain.to_hex() }]),
            )
            .await?;
        let current = Self::read_chain(provider).await;
        let accounts = self
            .cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts
            .clone();
        self.apply(accounts, current);
        Ok(())
    }

    async fn connector_provider(&self) -> Option<JsonRpcProvider> {
        self.provider.clone()
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        let accounts = parse_accounts(&provider.request("eth_accounts", json!([])).await?);
        let chain = Self::read_chain(provider).await;
        self.apply(accounts, chain);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
