use crate::{
    chain::{
        ChainId,
        Network,
        errors::{
            NetworkSwitchError,
            ProviderError,
            WriteError,
        },
    },
    wallets::{
        Eip1193Provider,
        WalletSession,
    },
};
use serde_json::json;
use tracing::debug;

/// Puts the session on `network`, trying the declarative switch first and the raw
/// provider second. Callers must not run two of these at once for one session.
pub async fn ensure_chain<W: WalletSession>(
    session: &W,
    network: &Network,
) -> Result<(), NetworkSwitchError> {
    let current = session.chain_id();
    debug!(
        current = ?current,
        target = %network.id,
        connector = %session.environment(),
        "ensuring chain"
    );
    if current == Some(network.id) {
        return Ok(());
    }

    match session.switch_chain(network.id).await {
        Ok(()) => {
            let post = session.chain_id();
            debug!(post = ?post, "declarative switch returned");
            if post == Some(network.id) {
                return Ok(());
            }
        }
        Err(err) => {
            debug!(%err, "declarative switch failed");
            if err.is_user_rejection() {
                return Err(NetworkSwitchError::UserRejected);
            }
        }
    }

    let Some(provider) = session.connector_provider().await else {
        return Err(NetworkSwitchError::Unsupported);
    };
    switch_with_provider(&provider, network).await
}

/// Raw `wallet_switchEthereumChain`, adding the network first when the wallet does
/// not know it, then confirms with a fresh `eth_chainId`.
pub async fn switch_with_provider<P: Eip1193Provider>(
    provider: &P,
    network: &Network,
) -> Result<(), NetworkSwitchError> {
    let before = read_chain(provider).await;
    debug!(before = ?before, "provider switch: current chain");

    if let Err(err) = provider
        .request("wallet_switchEthereumChain", network.switch_chain_params())
        .await
    {
        if err.is_user_rejection() {
            return Err(NetworkSwitchError::UserRejected);
        }
        if !err.is_unrecognized_chain() {
            return Err(NetworkSwitchError::failed(
                "Provider switch failed",
                Some(err),
            ));
        }
        debug!(chain = %network.id, "wallet does not know chain, adding it");
        add_then_switch(provider, network).await?;
    }

    let after = read_chain(provider).await;
    debug!(after = ?after, "provider switch: after chain");
    if after != Some(network.id) {
        return Err(NetworkSwitchError::failed(
            format!("Provider switch did not reach {}", network.name),
            None,
        ));
    }
    Ok(())
}

async fn add_then_switch<P: Eip1193Provider>(
    provider: &P,
    network: &Network,
) -> Result<(), NetworkSwitchError> {
    let classify = |err: ProviderError| {
        if err.is_user_rejection() {
            NetworkSwitchError::UserRejected
        } else {
            NetworkSwitchError::failed("Adding network failed", Some(err))
        }
    };
    provider
        .request("wallet_addEthereumChain", json!([network.add_chain_params()]))
        .await
        .map_err(classify)?;
    provider
        .request("wallet_switchEthereumChain", network.switch_chain_params())
        .await
        .map_err(classify)?;
    Ok(())
}

async fn read_chain<P: Eip1193Provider>(provider: &P) -> Option<ChainId> {
    provider
        .request("eth_chainId", json!([]))
        .await
        .ok()
        .and_then(|value| ChainId::from_value(&value))
}

/// Runs `action` once the chain is ensured. A chain mismatch from the action gets one
/// more ensure and exactly one retry; whatever the retry returns is passed through.
pub async fn with_chain_guard<T>(
    mut ensure: impl AsyncFnMut() -> Result<(), NetworkSwitchError>,
    mut action: impl AsyncFnMut() -> Result<T, ProviderError>,
) -> Result<T, WriteError> {
    ensure().await?;
    match action().await {
        Err(err) if err.is_chain_mismatch() => {
            debug!(%err, "retrying action after chain mismatch");
            ensure().await?;
            Ok(action().await?)
        }
        result => Ok(result?),
    }
}
