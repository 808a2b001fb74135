use crate::{
    chain::{
        ChainId,
        Network,
        ensure_chain,
        errors::{
            NetworkSwitchError,
            ProviderError,
            WriteError,
        },
        with_chain_guard,
    },
    contracts::{
        Address,
        GAME_CONTRACT,
        GameCall,
        MenuAction,
        NonceSource,
        PendingAction,
        ReceiptStatus,
        TransactionRequest,
        TxHash,
        fetch_receipt,
        submit,
    },
    round::{
        Direction,
        GameOverSummary,
        GameState,
        GuessOutcome,
        RevealTicket,
        RoundEngine,
    },
    scores::ScoreStore,
    terms::{
        Difficulty,
        Term,
    },
    wallets::{
        self,
        WalletEvent,
        WalletSession,
        WalletState,
    },
};
use rand::{
    Rng,
    rngs::StdRng,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

const CONNECT_WALLET_MESSAGE: &str = "Connect your wallet to continue.";
const MENU_FALLBACK_MESSAGE: &str = "Transaction failed.";

/// Status line of the win / draw / lose menu.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MenuStatus {
    pub message: Option<String>,
    pub error: Option<String>,
    pub tx: Option<TxHash>,
    pub settled: bool,
}

/// Everything the frontend needs to draw one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSnapshot {
    pub state: GameState,
    pub difficulty: Option<Difficulty>,
    pub top: Option<Term>,
    pub bottom: Option<Term>,
    pub revealed: bool,
    pub verdict: Option<bool>,
    pub can_guess: bool,
    pub score: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub high_score: u32,
    pub tier_best: Option<u32>,
    pub summary: Option<GameOverSummary>,
    pub tx_error: Option<String>,
    pub network_error: Option<String>,
    pub menu: MenuStatus,
    pub menu_tx_url: Option<String>,
    pub account: Option<String>,
    pub chain_id: Option<ChainId>,
    pub network_name: String,
    pub on_required_chain: bool,
}

/// Drives the round engine behind on-chain writes: every difficulty selection, replay
/// and difficulty change is recorded on the game contract before the game moves on.
/// Writes take `&mut self`, so at most one is ever in flight.
pub struct GameController<W, S, R = StdRng> {
    engine: RoundEngine<S, R>,
    wallet: W,
    network: Network,
    game_contract: Address,
    nonces: NonceSource,
    tx_error: Option<String>,
    network_error: Option<String>,
    menu: MenuStatus,
}

impl<W: WalletSession, S: ScoreStore, R: Rng> GameController<W, S, R> {
    pub fn new(engine: RoundEngine<S, R>, wallet: W, network: Network) -> Self {
        let mut controller = Self {
            engine,
            wallet,
            network,
            game_contract: GAME_CONTRACT,
            nonces: NonceSource::new(),
            tx_error: None,
            network_error: None,
            menu: MenuStatus::default(),
        };
        if let Some(chain) = controller.wallet.chain_id() {
            controller.on_chain_changed(chain);
        }
        controller
    }

    pub fn with_game_contract(mut self, address: Address) -> Self {
        self.game_contract = address;
        self
    }

    pub fn engine(&self) -> &RoundEngine<S, R> {
        &self.engine
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn tx_error(&self) -> Option<&str> {
        self.tx_error.as_deref()
    }

    pub fn network_error(&self) -> Option<&str> {
        self.network_error.as_deref()
    }

    pub fn menu(&self) -> &MenuStatus {
        &self.menu
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let engine = &self.engine;
        let difficulty = engine.difficulty();
        let chain_id = self.wallet.chain_id();
        GameSnapshot {
            state: engine.state(),
            difficulty,
            top: engine.top().cloned(),
            bottom: engine.bottom().cloned(),
            revealed: engine.is_revealed(),
            verdict: engine.verdict(),
            can_guess: engine.can_guess(),
            score: engine.score(),
            streak: engine.streak(),
            best_streak: engine.best_streak(),
            high_score: engine.high_scores().global,
            tier_best: difficulty.map(|d| engine.high_scores().for_tier(d)),
            summary: engine.summary(),
            tx_error: self.tx_error.clone(),
            network_error: self.network_error.clone(),
            menu: self.menu.clone(),
            menu_tx_url: self.menu.tx.as_ref().map(|h| self.network.tx_url(&h.0)),
            account: self.wallet.account(),
            chain_id,
            network_name: self.network.name.clone(),
            on_required_chain: chain_id == Some(self.network.id),
        }
    }

    /// Player-facing text for a failed reconciliation.
    pub fn network_message(&self, err: &NetworkSwitchError) -> String {
        let name = &self.network.name;
        match err {
            NetworkSwitchError::UserRejected => format!("Please switch to {name} to play."),
            NetworkSwitchError::Unsupported => {
                format!("This wallet cannot switch automatically. Please switch to {name} to play.")
            }
            NetworkSwitchError::Failed { .. } => {
                format!("Unable to switch to {name}. Please switch to {name} to play.")
            }
        }
    }

    fn on_chain_changed(&mut self, chain: ChainId) {
        if chain == self.network.id {
            self.network_error = None;
        } else {
            self.network_error = Some(format!("Please switch to {} to play.", self.network.name));
        }
    }

    pub fn handle_wallet_event(&mut self, event: WalletEvent) {
        debug!(?event, "wallet event");
        match event {
            WalletEvent::ChainChanged(chain) => self.on_chain_changed(chain),
            WalletEvent::AccountsChanged(accounts) => {
                info!(account = accounts.first().map(String::as_str), "wallet accounts changed");
            }
            WalletEvent::Disconnected => {
                info!("wallet disconnected");
                self.menu = MenuStatus::default();
            }
        }
    }

    pub async fn refresh_wallet(&mut self) {
        if let Err(err) = self.wallet.refresh().await {
            debug!(%err, "wallet refresh failed");
        }
    }

    /// Connects through the session's provider and remembers the connector kind.
    pub async fn connect_wallet(
        &mut self,
        request_accounts: bool,
    ) -> Result<WalletState, ProviderError> {
        let provider = self
            .wallet
            .connector_provider()
            .await
            .ok_or_else(|| ProviderError::transport("No wallet available"))?;
        let environment = self.wallet.environment();
        let state = wallets::connect(
            &provider,
            environment,
            request_accounts,
            self.engine.store_mut(),
        )
        .await?;
        self.refresh_wallet().await;
        if let Some(chain) = self.wallet.chain_id() {
            self.on_chain_changed(chain);
        }
        Ok(state)
    }

    /// Runs chain reconciliation on demand and records the outcome as the network
    /// message.
    pub async fn require_chain(&mut self) -> Result<(), NetworkSwitchError> {
        let result = ensure_chain(&self.wallet, &self.network).await;
        match &result {
            Ok(()) => self.network_error = None,
            Err(err) => {
                warn!(%err, "network switch failed");
                self.network_error = Some(self.network_message(err));
            }
        }
        result
    }

    /// Sends one game-contract write behind the chain guard. Returns true once the
    /// wallet accepted it.
    async fn run_write(&mut self, action: PendingAction, call: GameCall) -> bool {
        self.tx_error = None;
        self.network_error = None;

        let request = TransactionRequest::game(self.game_contract, call, self.network.id)
            .with_from(self.wallet.account());
        let wallet = &self.wallet;
        let network = &self.network;
        let result = with_chain_guard(
            async || ensure_chain(wallet, network).await,
            async || {
                let provider = wallet
                    .connector_provider()
                    .await
                    .ok_or_else(|| ProviderError::transport("Connector not connected."))?;
                submit(&provider, &request).await
            },
        )
        .await;

        match result {
            Ok(hash) => {
                info!(%action, %hash, "game write accepted");
                true
            }
            Err(err) => {
                self.record_write_error(action, &err);
                false
            }
        }
    }

    fn record_write_error(&mut self, action: PendingAction, err: &WriteError) {
        if let WriteError::Network(network) = err {
            self.network_error = Some(self.network_message(network));
        }
        if err.is_expected() {
            debug!(%action, %err, "write abandoned");
            return;
        }
        warn!(%action, %err, "game write failed");
        self.tx_error = Some(err.user_message());
    }

    /// Writes `selectMode` and starts the round. Refused without a write unless the
    /// engine is waiting for a difficulty.
    pub async fn select_difficulty(&mut self, difficulty: Difficulty) -> bool {
        if self.engine.state() != GameState::SelectingDifficulty {
            debug!(state = ?self.engine.state(), %difficulty, "difficulty selection ignored");
            return false;
        }
        let call = GameCall::SelectMode {
            difficulty,
            nonce: self.nonces.next(),
        };
        if !self
            .run_write(PendingAction::Select(difficulty), call)
            .await
        {
            return false;
        }
        self.engine.select_difficulty(difficulty).is_ok()
    }

    pub async fn play_again(&mut self) -> bool {
        if self.engine.state() != GameState::GameOver
            || self.engine.difficulty().is_none()
        {
            return false;
        }
        let call = GameCall::PlayAgain {
            nonce: self.nonces.next(),
        };
        if !self.run_write(PendingAction::PlayAgain, call).await {
            return false;
        }
        self.engine.play_again().is_ok()
    }

    /// With no difficulty chosen yet this only resets; otherwise the change is written
    /// first.
    pub async fn change_difficulty(&mut self) -> bool {
        match self.engine.state() {
            GameState::SelectingDifficulty => {
                return self.engine.change_difficulty().is_ok();
            }
            GameState::GameOver => {}
            _ => return false,
        }
        let call = GameCall::ChangeDifficulty {
            nonce: self.nonces.next(),
        };
        if !self
            .run_write(PendingAction::ChangeDifficulty, call)
            .await
        {
            return false;
        }
        self.engine.change_difficulty().is_ok()
    }

    pub fn guess(&mut self, direction: Direction) -> Option<GuessOutcome> {
        self.engine.guess(direction)
    }

    pub fn complete_reveal(&mut self, ticket: RevealTicket) -> Option<GameState> {
        self.engine.complete_reveal(ticket)
    }

    /// Explicit "switch network" request from the player.
    pub async fn switch_network(&mut self) -> bool {
        self.require_chain().await.is_ok()
    }

    fn menu_network_message(&self, err: &NetworkSwitchError) -> String {
        let name = &self.network.name;
        match err {
            NetworkSwitchError::UserRejected => format!("Please switch to {name} to continue."),
            NetworkSwitchError::Unsupported => {
                format!("This wallet cannot switch automatically. Please switch to {name}.")
            }
            NetworkSwitchError::Failed { .. } => {
                format!("Unable to switch to {name}. Please switch in your wallet.")
            }
        }
    }

    /// Records a win, draw or loss with a small payment to that action's contract.
    pub async fn menu_action(&mut self, action: MenuAction) -> bool {
        self.menu = MenuStatus::default();

        let Some(account) = self.wallet.account() else {
            self.menu.error = Some(CONNECT_WALLET_MESSAGE.to_string());
            return false;
        };

        if self.wallet.chain_id() != Some(self.network.id) {
            let ensured = ensure_chain(&self.wallet, &self.network).await;
            if let Err(err) = ensured {
                self.menu.error = Some(self.menu_network_message(&err));
                return false;
            }
        }

        let pending = PendingAction::Menu(action);
        self.menu.message = Some("Confirm in wallet...".to_string());
        let request = TransactionRequest::menu(action, self.network.id).with_from(Some(account));
        let result = match self.wallet.connector_provider().await {
            Some(provider) => submit(&provider, &request).await,
            None => Err(ProviderError::transport("Connector not connected.")),
        };

        match result {
            Ok(hash) => {
                info!(%pending, %hash, "menu action submitted");
                self.menu.message = Some(format!("Submitted to {}.", self.network.name));
                self.menu.tx = Some(hash);
                true
            }
            Err(err) => {
                warn!(%pending, %err, "menu action failed");
                self.menu.message = None;
                self.menu.error = Some(
                    err.short_message
                        .clone()
                        .filter(|m| !m.trim().is_empty())
                        .or(Some(err.message).filter(|m| !m.trim().is_empty()))
                        .unwrap_or_else(|| MENU_FALLBACK_MESSAGE.to_string()),
                );
                false
            }
        }
    }

    /// Checks the last menu transaction once. `None` while it is still pending or when
    /// nothing is being watched.
    pub async fn poll_menu_receipt(&mut self) -> Option<ReceiptStatus> {
        let hash = self.menu.tx.clone().filter(|_| !self.menu.settled)?;
        let provider = self.wallet.connector_provider().await?;
        let status = match fetch_receipt(&provider, &hash).await {
            Ok(status) => status?,
            Err(err) => {
                debug!(%err, %hash, "receipt lookup failed");
                return None;
            }
        };
        self.menu.settled = true;
        match status {
            ReceiptStatus::Success => {
                self.menu.message = Some(format!("Confirmed on {}.", self.network.name));
                self.menu.error = None;
            }
            ReceiptStatus::Reverted => {
                self.menu.error = Some("Transaction reverted.".to_string());
            }
        }
        Some(status)
    }
}

/// Delivers `ticket` on `sender` once its reveal delay has elapsed.
pub fn schedule_reveal(ticket: RevealTicket, sender: mpsc::UnboundedSender<RevealTicket>) {
    tokio::spawn(async move {
        tokio::time::sleep(ticket.delay).await;
        let _ = sender.send(ticket);
    });
}
