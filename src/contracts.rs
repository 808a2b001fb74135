use crate::{
    chain::{
        ChainId,
        errors::ProviderError,
    },
    terms::Difficulty,
    wallets::Eip1193Provider,
};
use chrono::Utc;
use serde_json::{
    Value,
    json,
};
use sha3::{
    Digest,
    Keccak256,
};
use std::{
    fmt,
    str::FromStr,
};
use tracing::{
    debug,
    info,
};

pub const GAME_CONTRACT: Address = Address::from_hex("0x4c281f04359466C4ede3F91522bC1934ac09277B");
pub const WIN_CONTRACT: Address = Address::from_hex("0x9de1ec90a9e024608327D48D0161A6c359D0EC90");
pub const DRAW_CONTRACT: Address = Address::from_hex("0x523E05808B5443EB404140056f2F98b2DB1946bB");
pub const LOSE_CONTRACT: Address = Address::from_hex("0x5049175C0f622640b9b7E6EbBc8c0f07fd9790fB");

/// 0.000001 ETH.
pub const MENU_ACTION_VALUE_WEI: u128 = 1_000_000_000_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Compile-time parse of a `0x`-prefixed, 40 digit hex literal.
    pub const fn from_hex(s: &str) -> Self {
        let bytes = s.as_bytes();
        assert!(bytes.len() == 42, "address must be 0x followed by 40 hex digits");
        assert!(bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X'));
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (nibble(bytes[2 + i * 2]) << 4) | nibble(bytes[3 + i * 2]);
            i += 1;
        }
        Address(out)
    }
}

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address"),
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
    #[error("invalid hex in address: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressParseError::MissingPrefix)?;
        let bytes = hex::decode(digits)?;
        let len = bytes.len();
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressParseError::Length(len))?;
        Ok(Address(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// First four bytes of the Keccak-256 of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Big-endian, left-padded 32 byte ABI word.
fn encode_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_call(signature: &str, args: &[u128]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&encode_uint(*arg));
    }
    data
}

/// Writes to the game contract. Every call carries a caller-chosen nonce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GameCall {
    SelectMode { difficulty: Difficulty, nonce: u128 },
    PlayAgain { nonce: u128 },
    ChangeDifficulty { nonce: u128 },
}

impl GameCall {
    pub fn signature(&self) -> &'static str {
        match self {
            GameCall::SelectMode { .. } => "selectMode(uint8,uint256)",
            GameCall::PlayAgain { .. } => "playAgain(uint256)",
            GameCall::ChangeDifficulty { .. } => "changeDifficulty(uint256)",
        }
    }

    pub fn calldata(&self) -> Vec<u8> {
        match *self {
            GameCall::SelectMode { difficulty, nonce } => {
                encode_call(self.signature(), &[u128::from(difficulty.ordinal()), nonce])
            }
            GameCall::PlayAgain { nonce } | GameCall::ChangeDifficulty { nonce } => {
                encode_call(self.signature(), &[nonce])
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MenuAction {
    Win,
    Draw,
    Lose,
}

impl MenuAction {
    pub fn contract(self) -> Address {
        match self {
            MenuAction::Win => WIN_CONTRACT,
            MenuAction::Draw => DRAW_CONTRACT,
            MenuAction::Lose => LOSE_CONTRACT,
        }
    }

    /// The deployed contract spells the losing entrypoint `loose`.
    pub fn function_name(self) -> &'static str {
        match self {
            MenuAction::Win => "win",
            MenuAction::Draw => "draw",
            MenuAction::Lose => "loose",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::Win => "Win",
            MenuAction::Draw => "Draw",
            MenuAction::Lose => "Loose",
        }
    }

    pub fn calldata(self) -> Vec<u8> {
        encode_call(&format!("{}()", self.function_name()), &[])
    }
}

/// Something the player started that is waiting on the wallet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PendingAction {
    Select(Difficulty),
    PlayAgain,
    ChangeDifficulty,
    Menu(MenuAction),
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingAction::Select(tier) => write!(f, "select-{}", tier.key()),
            PendingAction::PlayAgain => write!(f, "play-again"),
            PendingAction::ChangeDifficulty => write!(f, "change-difficulty"),
            PendingAction::Menu(action) => write!(f, "menu-{}", action.function_name()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRequest {
    pub from: Option<String>,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: u128,
    pub chain_id: ChainId,
}

impl TransactionRequest {
    pub fn game(to: Address, call: GameCall, chain_id: ChainId) -> Self {
        Self {
            from: None,
            to,
            data: call.calldata(),
            value: 0,
            chain_id,
        }
    }

    pub fn menu(action: MenuAction, chain_id: ChainId) -> Self {
        Self {
            from: None,
            to: action.contract(),
            data: action.calldata(),
            value: MENU_ACTION_VALUE_WEI,
            chain_id,
        }
    }

    pub fn with_from(mut self, from: Option<String>) -> Self {
        self.from = from;
        self
    }

    pub fn to_json(&self) -> Value {
        let mut tx = json!({
            "to": self.to.to_string(),
            "data": format!("0x{}", hex::encode(&self.data)),
            "value": format!("{:#x}", self.value),
            "chainId": self.chain_id.to_hex(),
        });
        if let (Some(from), Some(obj)) = (&self.from, tx.as_object_mut()) {
            obj.insert("from".to_string(), Value::String(from.clone()));
        }
        tx
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sends a transaction after confirming the wallet is on the request's chain.
pub async fn submit<P: Eip1193Provider>(
    provider: &P,
    request: &TransactionRequest,
) -> Result<TxHash, ProviderError> {
    let current = provider
        .request("eth_chainId", json!([]))
        .await
        .ok()
        .and_then(|v| ChainId::from_value(&v));
    if current != Some(request.chain_id) {
        return Err(ProviderError::chain_mismatch(request.chain_id, current));
    }

    debug!(to = %request.to, value = request.value, "sending transaction");
    let result = provider
        .request("eth_sendTransaction", json!([request.to_json()]))
        .await?;
    let hash = result
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::transport("wallet returned no transaction hash"))?;
    info!(%hash, to = %request.to, "transaction submitted");
    Ok(TxHash(hash))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// `None` while the transaction is still pending.
pub async fn fetch_receipt<P: Eip1193Provider>(
    provider: &P,
    hash: &TxHash,
) -> Result<Option<ReceiptStatus>, ProviderError> {
    let receipt = provider
        .request("eth_getTransactionReceipt", json!([hash.0]))
        .await?;
    if receipt.is_null() {
        return Ok(None);
    }
    let status = match receipt.get("status").and_then(Value::as_str) {
        Some("0x1") => ReceiptStatus::Success,
        _ => ReceiptStatus::Reverted,
    };
    Ok(Some(status))
}

/// Millisecond timestamps, bumped when two calls land in the same millisecond.
#[derive(Clone, Debug, Default)]
pub struct NonceSource {
    last: u128,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u128 {
        let now = u128::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.last = now.max(self.last + 1);
        self.last
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn selector__matches_well_known_erc20_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn select_mode_calldata__is_selector_then_two_words() {
        // given
        let call = GameCall::SelectMode {
            difficulty: Difficulty::Hard,
            nonce: 0x0102,
        };

        // when
        let data = call.calldata();

        // then
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &selector("selectMode(uint8,uint256)"));
        assert!(data[4..35].iter().all(|b| *b == 0));
        assert_eq!(data[35], 2);
        assert_eq!(&data[66..68], &[0x01, 0x02]);
    }

    #[test]
    fn menu_calldata__is_bare_selector() {
        assert_eq!(MenuAction::Lose.calldata(), selector("loose()").to_vec());
        assert_eq!(MenuAction::Win.calldata().len(), 4);
    }

    #[test]
    fn address__parses_and_displays_lowercase() {
        let parsed: Address = "0x4c281f04359466C4ede3F91522bC1934ac09277B".parse().unwrap();
        assert_eq!(parsed, GAME_CONTRACT);
        assert_eq!(
            parsed.to_string(),
            "0x4c281f04359466c4ede3f91522bc1934ac09277b"
        );
        assert_eq!(
            "4c281f04".parse::<Address>(),
            Err(AddressParseError::MissingPrefix)
        );
        assert_eq!("0x4c28".parse::<Address>(), Err(AddressParseError::Length(2)));
    }

    #[test]
    fn menu_request__carries_the_fixed_value_as_hex_quantity() {
        let tx = TransactionRequest::menu(MenuAction::Draw, ChainId::BASE)
            .with_from(Some("0xabc".to_string()))
            .to_json();
        assert_eq!(tx["value"], "0xe8d4a51000");
        assert_eq!(tx["chainId"], "0x2105");
        assert_eq!(tx["from"], "0xabc");
        assert_eq!(tx["to"], DRAW_CONTRACT.to_string());
    }

    #[test]
    fn pending_action__displays_as_action_keys() {
        assert_eq!(
            PendingAction::Select(Difficulty::Medium).to_string(),
            "select-medium"
        );
        assert_eq!(PendingAction::PlayAgain.to_string(), "play-again");
        assert_eq!(PendingAction::Menu(MenuAction::Lose).to_string(), "menu-loose");
    }

    #[test]
    fn nonce_source__is_strictly_increasing() {
        let mut nonces = NonceSource::new();
        let a = nonces.next();
        let b = nonces.next();
        let c = nonces.next();
        assert!(a < b && b < c);
    }
}
