use clap::{
    Parser,
    ValueEnum,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use higher_lower::{
    ChainId,
    Network,
    contracts::{
        Address,
        GAME_CONTRACT,
    },
    round::REVEAL_DELAY,
};
use std::{
    path::PathBuf,
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChainArg {
    Base,
    BaseSepolia,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WalletArg {
    /// Mini-app host when one is configured, otherwise the injected wallet
    Auto,
    Simulated,
}

/// Higher or lower: guess which search term gets more searches.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Network every game write must happen on
    #[arg(long, value_enum, default_value = "base")]
    chain: ChainArg,

    /// RPC endpoint advertised when the wallet has to add the network
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long, value_enum, default_value = "simulated")]
    wallet: WalletArg,

    /// JSON-RPC endpoint of an embedding mini-app host
    #[arg(long, env = "HIGHER_LOWER_MINI_APP_URL")]
    mini_app_url: Option<String>,

    /// JSON-RPC endpoint of an injected wallet
    #[arg(long, env = "HIGHER_LOWER_WALLET_URL")]
    wallet_url: Option<String>,

    /// Starting chain of the simulated wallet (decimal or 0x hex)
    #[arg(long, default_value = "1")]
    simulated_chain: ChainId,

    /// Term catalog JSON; the built-in catalog is used when omitted
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory for scores.json and logs/
    #[arg(long, default_value = "~/.higher-lower")]
    data_dir: String,

    #[arg(long, default_value_t = REVEAL_DELAY.as_millis() as u64)]
    reveal_delay_ms: u64,

    #[arg(long, default_value_t = GAME_CONTRACT)]
    game_contract: Address,
}

impl Cli {
    fn into_config(self) -> Result<client::AppConfig> {
        let network = match self.chain {
            ChainArg::Base => Network::base(),
            ChainArg::BaseSepolia => Network::base_sepolia(),
        };
        let network = match self.rpc_url {
            Some(url) => network.with_rpc_url(url),
            None => network,
        };
        let wallet = match self.wallet {
            WalletArg::Simulated => client::WalletConfig::Simulated {
                chain: self.simulated_chain,
            },
            WalletArg::Auto => {
                if self.mini_app_url.is_none() && self.wallet_url.is_none() {
                    return Err(eyre!(
                        "--wallet auto needs --mini-app-url or --wallet-url"
                    ));
                }
                client::WalletConfig::Rpc {
                    mini_app_url: self.mini_app_url,
                    injected_url: self.wallet_url,
                }
            }
        };
        let data_dir = PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned());
        Ok(client::AppConfig {
            network,
            wallet,
            catalog: self.catalog,
            data_dir,
            reveal_delay: Duration::from_millis(self.reveal_delay_ms),
            game_contract: self.game_contract,
        })
    }
}

fn init_tracing(data_dir: &std::path::Path) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("creating log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "higher-lower.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("failed to install tracing subscriber: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Cli::parse().into_config()?;
    init_tracing(&config.data_dir)?;
    client::run_app(config).await
}
