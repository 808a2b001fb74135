use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use crossterm::event::EventStream;
use futures::StreamExt;
use higher_lower::{
    ChainId,
    GameController,
    Network,
    RoundEngine,
    TermCatalog,
    app::schedule_reveal,
    contracts::{
        Address,
        PendingAction,
    },
    scores::JsonFileScoreStore,
    simulated::SimulatedWallet,
    wallets::{
        RpcWallet,
        WalletSession,
        persisted_connector,
    },
};
use rand::Rng;
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio::{
    sync::{
        broadcast::error::RecvError,
        mpsc,
    },
    time,
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Rpc {
        mini_app_url: Option<String>,
        injected_url: Option<String>,
    },
    Simulated {
        chain: ChainId,
    },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: Network,
    pub wallet: WalletConfig,
    pub catalog: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub reveal_delay: Duration,
    pub game_contract: Address,
}

type Controller<W> = GameController<W, JsonFileScoreStore>;

pub async fn run_app(config: AppConfig) -> Result<()> {
    let catalog = match &config.catalog {
        Some(path) => TermCatalog::load(path)
            .wrap_err_with(|| format!("loading term catalog from {}", path.display()))?,
        None => TermCatalog::builtin().wrap_err("loading built-in term catalog")?,
    };
    let store = JsonFileScoreStore::open(&config.data_dir)
        .wrap_err_with(|| format!("opening score store in {}", config.data_dir.display()))?;
    let engine = RoundEngine::new(catalog, store).with_reveal_delay(config.reveal_delay);
    info!(terms = engine.catalog().terms().len(), network = %config.network.name, "starting");

    match config.wallet.clone() {
        WalletConfig::Simulated { chain } => {
            let wallet = SimulatedWallet::on_chain(chain);
            let controller = GameController::new(engine, wallet, config.network.clone())
                .with_game_contract(config.game_contract);
            run_with(controller, true).await
        }
        WalletConfig::Rpc {
            mini_app_url,
            injected_url,
        } => {
            let wallet = RpcWallet::from_urls(mini_app_url.as_deref(), injected_url.as_deref())
                .wrap_err("creating wallet provider")?;
            info!(environment = %wallet.environment(), "wallet detected");
            let controller = GameController::new(engine, wallet, config.network.clone())
                .with_game_contract(config.game_contract);
            let reconnect = persisted_connector(controller.engine().store()).is_some();
            run_with(controller, reconnect).await
        }
    }
}

async fn run_with<W: WalletSession>(mut controller: Controller<W>, reconnect: bool) -> Result<()> {
    if reconnect {
        // A remembered connector reconnects silently; no account prompt
        if let Err(err) = controller.connect_wallet(false).await {
            warn!(%err, "wallet reconnect failed");
        }
    }

    let mut ui_state = ui::UiState::default();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<W: WalletSession, R: Rng>(
    controller: &mut GameController<W, JsonFileScoreStore, R>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let (reveal_tx, mut reveal_rx) = mpsc::unbounded_channel();
    let mut wallet_events = controller.wallet().subscribe();
    let mut terminal_events = EventStream::new();
    let mut ticker = time::interval(Duration::from_millis(1000));
    ui::draw(ui_state, &controller.snapshot())?;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.refresh_wallet().await;
                controller.poll_menu_receipt().await;
            }
            Some(ticket) = reveal_rx.recv() => {
                controller.complete_reveal(ticket);
            }
            event = wallet_events.recv() => match event {
                Ok(event) => controller.handle_wallet_event(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "wallet events lagged"),
                Err(RecvError::Closed) => {
                    wallet_events = controller.wallet().subscribe();
                }
            },
            ev = terminal_events.next() => {
                let Some(ev) = ev else { break };
                let Some(user_event) = ui::map_event(ui_state, ev?) else { continue };
                match user_event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Guess(direction) => {
                        if let Some(outcome) = controller.guess(direction) {
                            schedule_reveal(outcome.ticket, reveal_tx.clone());
                        }
                    }
                    ui::UserEvent::SelectDifficulty(difficulty) => {
                        processing(ui_state, controller, PendingAction::Select(difficulty).to_string())?;
                        controller.select_difficulty(difficulty).await;
                    }
                    ui::UserEvent::PlayAgain => {
                        processing(ui_state, controller, PendingAction::PlayAgain.to_string())?;
                        controller.play_again().await;
                    }
                    ui::UserEvent::ChangeDifficulty => {
                        processing(ui_state, controller, PendingAction::ChangeDifficulty.to_string())?;
                        controller.change_difficulty().await;
                    }
                    ui::UserEvent::SwitchNetwork => {
                        processing(ui_state, controller, "network switch".to_string())?;
                        controller.switch_network().await;
                    }
                    ui::UserEvent::ConnectWallet => {
                        processing(ui_state, controller, "wallet connect".to_string())?;
                        if let Err(err) = controller.connect_wallet(true).await {
                            warn!(%err, "wallet connect failed");
                        }
                    }
                    ui::UserEvent::Menu(action) => {
                        processing(ui_state, controller, PendingAction::Menu(action).to_string())?;
                        controller.menu_action(action).await;
                    }
                }
                ui_state.set_processing(None);
            }
        }
        ui::draw(ui_state, &controller.snapshot())?;
    }
    Ok(())
}

/// Draws a waiting status before handing control to the wallet.
fn processing<W: WalletSession, R: Rng>(
    ui_state: &mut ui::UiState,
    controller: &GameController<W, JsonFileScoreStore, R>,
    label: String,
) -> Result<()> {
    ui_state.set_processing(Some(label));
    ui::draw(ui_state, &controller.snapshot())
}
