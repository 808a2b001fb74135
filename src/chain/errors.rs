use crate::chain::ChainId;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

pub const USER_REJECTED_CODE: i64 = 4001;
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
pub const ACTION_REJECTED: &str = "ACTION_REJECTED";
pub const CHAIN_MISMATCH_NAME: &str = "ChainMismatchError";
pub const TX_FALLBACK_MESSAGE: &str = "Transaction failed. Please try again.";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcErrorCode {
    Numeric(i64),
    Named(String),
}

/// An EIP-1193 / JSON-RPC error as reported by a wallet or transport.
#[derive(Clone, Debug, PartialEq, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ProviderError {
    #[serde(default)]
    pub code: Option<RpcErrorCode>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub short_message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(RpcErrorCode::Numeric(code)),
            message: message.into(),
            short_message: None,
            name: None,
            data: None,
        }
    }

    /// An error raised outside the wallet (HTTP failure, malformed reply).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            short_message: None,
            name: None,
            data: None,
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_CODE, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain: ChainId) -> Self {
        Self::new(
            UNRECOGNIZED_CHAIN_CODE,
            format!("Unrecognized chain ID \"{}\".", chain.to_hex()),
        )
    }

    pub fn chain_mismatch(expected: ChainId, actual: Option<ChainId>) -> Self {
        let actual = actual
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let message = format!(
            "The current chain of the wallet (id: {actual}) does not match the target chain for the transaction (id: {expected})."
        );
        Self {
            code: None,
            short_message: Some("Chain mismatch".to_string()),
            message,
            name: Some(CHAIN_MISMATCH_NAME.to_string()),
            data: None,
        }
    }

    pub fn disconnected() -> Self {
        Self::new(4900, "The provider is disconnected from all chains.")
    }

    pub fn with_short_message(mut self, short: impl Into<String>) -> Self {
        self.short_message = Some(short.into());
        self
    }

    pub fn numeric_code(&self) -> Option<i64> {
        match &self.code {
            Some(RpcErrorCode::Numeric(code)) => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        match &self.code {
            Some(RpcErrorCode::Numeric(USER_REJECTED_CODE)) => return true,
            Some(RpcErrorCode::Named(name)) if name == ACTION_REJECTED => return true,
            _ => {}
        }
        self.message.to_lowercase().contains("rejected")
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.numeric_code() == Some(UNRECOGNIZED_CHAIN_CODE)
    }

    pub fn is_chain_mismatch(&self) -> bool {
        if self.name.as_deref() == Some(CHAIN_MISMATCH_NAME) {
            return true;
        }
        let text = self.short_message.as_deref().unwrap_or(&self.message);
        text.to_lowercase().contains("chain mismatch")
    }
}

/// Outcome of reconciling the wallet's network; `Ok(())` means on the required chain.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum NetworkSwitchError {
    #[error("User rejected network switch")]
    UserRejected,
    #[error("This wallet cannot switch networks automatically")]
    Unsupported,
    #[error("{reason}")]
    Failed {
        reason: String,
        #[source]
        cause: Option<ProviderError>,
    },
}

impl NetworkSwitchError {
    pub fn failed(reason: impl Into<String>, cause: Option<ProviderError>) -> Self {
        Self::Failed {
            reason: reason.into(),
            cause,
        }
    }

    /// Only a non-converging switch is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Network(#[from] NetworkSwitchError),
    #[error(transparent)]
    Transaction(#[from] ProviderError),
}

impl WriteError {
    pub fn is_chain_mismatch(&self) -> bool {
        matches!(self, Self::Transaction(err) if err.is_chain_mismatch())
    }

    /// Rejections and unsupported wallets are outcomes, not failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Network(NetworkSwitchError::UserRejected | NetworkSwitchError::Unsupported)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Network(err) => err.to_string(),
            Self::Transaction(err) => err
                .short_message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .or(Some(err.message.as_str()).filter(|m| !m.trim().is_empty()))
                .unwrap_or(TX_FALLBACK_MESSAGE)
                .to_string(),
        }
    }
}
