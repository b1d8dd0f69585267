// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use custody_authority::{
    activity::{ActivityEngine, ActivitySweeper, ProofSigner},
    api::router,
    bootstrap,
    config::{AppConfig, LogFormat},
    coordination::{KeyValueStore, MemoryStore},
    enclave::{EnclaveClient, HttpEnclaveClient},
    state::AppState,
    storage::Database,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const KEY_PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_enclave(config: &AppConfig) -> Arc<dyn EnclaveClient> {
    match &config.enclave_url {
        Some(url) => {
            let client = HttpEnclaveClient::new(url.clone(), config.engine.enclave_timeout)
                .expect("Failed to build enclave client");
            tracing::info!(enclave_url = %url, "Using remote enclave signer");
            Arc::new(client)
        }
        #[cfg(feature = "dev")]
        None => {
            tracing::warn!("ENCLAVE_URL not set: using the in-process simulated signer (dev only)");
            Arc::new(custody_authority::enclave::SimulatedEnclave::new())
        }
        #[cfg(not(feature = "dev"))]
        None => {
            eprintln!("ENCLAVE_URL is required");
            std::process::exit(1);
        }
    }
}

/// Periodically drop expired coordination keys nobody reads again.
async fn purge_expired_keys(store: Arc<MemoryStore>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(KEY_PURGE_INTERVAL) => {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = store.len(), "Purged expired coordination keys");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);
    tracing::info!(?config, "Starting custody authority");

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let db = Arc::new(Database::open(&config.database_path()).expect("Failed to open database"));
    let store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let shutdown = CancellationToken::new();
    let purge_task = tokio::spawn(purge_expired_keys(store, shutdown.clone()));

    let proofs = match &config.proof_signing_key {
        Some(key) => ProofSigner::new(key),
        None => {
            tracing::warn!("PROOF_SIGNING_KEY not set: proof attestations will not survive restarts");
            ProofSigner::ephemeral()
        }
    };

    if let Some(bootstrap) = &config.bootstrap {
        match bootstrap::provision(&db, bootstrap) {
            Ok(Some(invitation)) => {
                // Printed once so the operator can redeem it; never logged.
                println!("Admin invitation token for {}: {}", invitation.email, invitation.token);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Bootstrap failed");
                std::process::exit(1);
            }
        }
    }

    let engine = ActivityEngine::new(
        Arc::clone(&db),
        build_enclave(&config),
        Arc::clone(&kv),
        proofs,
        config.engine.clone(),
    );

    let sweeper = ActivitySweeper::new(engine.clone()).with_interval(config.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

    let state = AppState::new(db, kv, engine, config.session_ttl);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let handle: Handle<SocketAddr> = Handle::new();
    {
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            shutdown.cancel();
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
        });
    }

    let served = match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate");
            tracing::info!(%addr, "Listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::warn!(%addr, "TLS not configured: listening on plain http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };
    if let Err(e) = served {
        tracing::error!(error = %e, "Server failed");
    }

    shutdown.cancel();
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    if let Err(e) = purge_task.await {
        tracing::warn!(error = %e, "Key purge task ended abnormally");
    }
}
