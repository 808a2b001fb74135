pub mod app;

pub mod chain;

pub mod contracts;

pub mod round;

pub mod scores;

pub mod simulated;

pub mod terms;

pub mod wallets;

pub mod test_helpers;

pub use app::{
    GameController,
    GameSnapshot,
};
pub use chain::{
    ChainId,
    Network,
    errors::{
        NetworkSwitchError,
        ProviderError,
        WriteError,
    },
};
pub use round::{
    Direction,
    GameState,
    RoundEngine,
};
pub use terms::{
    Difficulty,
    Term,
    TermCatalog,
};
