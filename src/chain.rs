use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    str::FromStr,
};

pub mod errors;

mod ensure;

#[cfg(test)]
mod tests;

pub use ensure::{
    ensure_chain,
    switch_with_provider,
    with_chain_guard,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const BASE: ChainId = ChainId(8453);
    pub const BASE_SEPOLIA: ChainId = ChainId(84532);

    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    /// Reads a chain id as wallets report it: a JSON number, a `0x` hex string or a
    /// decimal string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(ChainId),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map(ChainId),
            None => s.parse::<u64>().map(ChainId),
        }
    }
}

/// Numbers become `0x<hex>`, strings pass through unchanged.
pub fn normalize_chain_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|id| ChainId(id).to_hex()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The one network every state-changing call must happen on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Network {
    pub id: ChainId,
    pub name: String,
    pub currency: NativeCurrency,
    pub rpc_url: String,
    pub explorer_url: String,
}

impl Network {
    pub fn base() -> Self {
        Self {
            id: ChainId::BASE,
            name: "Base".to_string(),
            currency: ether(),
            rpc_url: "https://mainnet.base.org".to_string(),
            explorer_url: "https://basescan.org".to_string(),
        }
    }

    pub fn base_sepolia() -> Self {
        Self {
            id: ChainId::BASE_SEPOLIA,
            name: "Base Sepolia".to_string(),
            currency: ether(),
            rpc_url: "https://sepolia.base.org".to_string(),
            explorer_url: "https://sepolia.basescan.org".to_string(),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Parameters for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.id.to_hex(),
            "chainName": self.name,
            "nativeCurrency": self.currency,
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        })
    }

    pub fn switch_chain_params(&self) -> Value {
        json!([{ "chainId": self.id.to_hex() }])
    }

    pub fn tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), hash)
    }
}

fn ether() -> NativeCurrency {
    NativeCurrency {
        name: "Ether".to_string(),
        symbol: "ETH".to_string(),
        decimals: 18,
    }
}
