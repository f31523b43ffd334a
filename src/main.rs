//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use storage_scan_indexer::api::create_router;
use storage_scan_indexer::app::{
    AppState, FinalityConfig, FinalityTracker, StatAggregator, StatConfig, SyncConfig, Syncer,
    parse_contract_address, spawn_loop,
};
use storage_scan_indexer::domain::AppError;
use storage_scan_indexer::infra::{
    EvmRpcClient, PostgresClient, PostgresConfig, RpcClientConfig, StorageNodeClient,
};

/// Application configuration
struct Config {
    database_url: SecretString,
    chain_rpc_url: String,
    /// Storage node endpoint; the finality tracker only runs when set
    storage_node_url: Option<String>,
    host: String,
    port: u16,
    sync: SyncConfig,
    finality: FinalityConfig,
    stats: StatConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url =
            SecretString::from(env::var("DATABASE_URL").context("DATABASE_URL not set")?);
        let chain_rpc_url = env::var("CHAIN_RPC_URL").context("CHAIN_RPC_URL not set")?;
        let storage_node_url = env::var("STORAGE_NODE_URL").ok().filter(|u| !u.is_empty());
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let flow = env::var("FLOW_CONTRACT_ADDRESS").context("FLOW_CONTRACT_ADDRESS not set")?;
        let mut contracts = vec![parse_contract_address("FLOW_CONTRACT_ADDRESS", &flow)?];
        for key in ["DA_ENTRANCE_CONTRACT_ADDRESS", "REWARD_CONTRACT_ADDRESS"] {
            if let Some(value) = env::var(key).ok().filter(|v| !v.is_empty()) {
                contracts.push(parse_contract_address(key, &value)?);
            }
        }

        let sync = SyncConfig {
            contracts,
            ..SyncConfig::from_env()
        };

        Ok(Self {
            database_url,
            chain_rpc_url,
            storage_node_url,
            host,
            port,
            sync,
            finality: FinalityConfig::from_env(),
            stats: StatConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🏗️  Storage Scan Indexer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let postgres_client =
        PostgresClient::new(config.database_url.expose_secret(), PostgresConfig::default())
            .await?;
    postgres_client.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");
    let store = Arc::new(postgres_client);

    let node = Arc::new(EvmRpcClient::new(
        &config.chain_rpc_url,
        RpcClientConfig::default(),
    )?);
    info!("   ✓ Chain client created");

    let app_state = Arc::new(AppState::new(store.clone(), node.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers: Vec<JoinHandle<Result<(), AppError>>> = Vec::new();

    if config.sync.worker.enabled {
        info!(
            "   ✓ Ingestion loop started (start block: {}, contracts: {})",
            config.sync.start_block,
            config.sync.contracts.len()
        );
        let worker = config.sync.worker.clone();
        let syncer = Arc::new(Syncer::new(store.clone(), node.clone(), config.sync));
        workers.push(spawn_loop(syncer, worker, shutdown_rx.clone()));
    } else {
        info!("   ○ Ingestion loop disabled");
    }

    match (&config.storage_node_url, config.finality.worker.enabled) {
        (Some(url), true) => {
            let oracle = Arc::new(StorageNodeClient::new(url, RpcClientConfig::default())?);
            let worker = config.finality.worker.clone();
            let tracker = Arc::new(FinalityTracker::new(store.clone(), oracle, config.finality));
            workers.push(spawn_loop(tracker, worker, shutdown_rx.clone()));
            info!("   ✓ Finality tracker started");
        }
        (None, true) => warn!("   ⚠ STORAGE_NODE_URL not set, finality tracker disabled"),
        (_, false) => info!("   ○ Finality tracker disabled"),
    }

    if config.stats.worker.enabled {
        let worker = config.stats.worker.clone();
        let aggregator = Arc::new(StatAggregator::new(store.clone(), config.stats));
        workers.push(spawn_loop(aggregator, worker, shutdown_rx.clone()));
        info!("   ✓ Stat aggregator started");
    } else {
        info!("   ○ Stat aggregator disabled");
    }

    let router = create_router(app_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Worker had stopped with an error"),
            Err(e) => error!(error = %e, "Worker task panicked"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
