// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service entry point: configuration, store, chain clients, background
//! workers, and the HTTP listener.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stakevault_server::{
    api::router,
    auth::TokenIssuer,
    chain::{rpc::RpcChainClient, ChainClient, ChainRegistry},
    clock::SystemClock,
    config::{self, SecuritySettings, TokenSettings},
    crypto::SecretBox,
    deposits::{confirm::ConfirmationTracker, scanner::DepositScanner},
    payout::PayoutExecutor,
    queue::JobQueue,
    signer::LocalHdSigner,
    staking::accrual::RewardAccruer,
    state::AppState,
    store::{ChainRepo, Store},
};

#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir = env::var(config::DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string());
    let db_path = PathBuf::from(&data_dir).join("stakevault.redb");
    let store = Arc::new(Store::open(&db_path).expect("Failed to open store"));
    info!(path = %db_path.display(), "Store opened");

    let token_settings = TokenSettings::from_env()
        .expect("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must be set");
    let master_key = env::var(config::MASTER_KEY_ENV).expect("MASTER_KEY must be set");
    let secrets = SecretBox::from_master_key(&master_key).expect("Master key derivation failed");
    let signer = Arc::new(LocalHdSigner::new(master_key.into_bytes()));

    let chains = Arc::new(build_chain_registry(&store));

    let shutdown = CancellationToken::new();
    let queue = JobQueue::new(shutdown.clone());

    let state = AppState::new(
        store,
        chains,
        queue,
        signer,
        Arc::new(SystemClock),
        TokenIssuer::new(token_settings),
        secrets,
        SecuritySettings::from_env(),
    );

    spawn_workers(&state, &shutdown);

    let app = router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    info!(%addr, "StakeVault server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .expect("Server failed");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    if format == "json" {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

/// One RPC client per active chain row, endpoint overridable per slug via
/// `{SLUG}_RPC_URL`.
fn build_chain_registry(store: &Arc<Store>) -> ChainRegistry {
    let mut registry = ChainRegistry::new();
    let chains = store
        .read(|tx| ChainRepo::new(tx).list_active())
        .unwrap_or_default();

    for chain in chains {
        let rpc_url = config::chain_rpc_url(&chain.slug).unwrap_or_else(|| chain.rpc_endpoint.clone());
        match RpcChainClient::new(&rpc_url, chain.chain_id) {
            Ok(client) => {
                info!(chain = %chain.slug, "Chain client configured");
                registry.insert(chain.id.clone(), Arc::new(client) as Arc<dyn ChainClient>);
            }
            Err(e) => {
                warn!(chain = %chain.slug, error = %e, "Skipping chain with bad RPC URL");
            }
        }
    }
    registry
}

fn spawn_workers(state: &AppState, shutdown: &CancellationToken) {
    tokio::spawn(DepositScanner::new(state.clone()).run(shutdown.clone()));
    tokio::spawn(ConfirmationTracker::new(state.clone()).run(shutdown.clone()));
    tokio::spawn(RewardAccruer::new(state.clone()).run(shutdown.clone()));
    PayoutExecutor::new(state.clone()).spawn();
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
    shutdown.cancel();
}
