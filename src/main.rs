use std::error::Error;
use std::sync::Arc;

use scan_desk::audit::ScanLog;
use scan_desk::codec::QrCodec;
use scan_desk::config::Config;
use scan_desk::notify::ChangeNotifier;
use scan_desk::persistence::{PARTICIPANTS_JOURNAL, SCANS_JOURNAL};
use scan_desk::registry::{JournaledStore, MemoryStore, ParticipantStore};
use scan_desk::scan::ScanProcessor;
use scan_desk::server::{self, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_desk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let codec = match &config.token_secret {
        Some(secret) => QrCodec::with_secret(secret.clone()),
        None => {
            warn!("SCAN_DESK_TOKEN_SECRET not set; structured tokens are not signed");
            QrCodec::new()
        }
    };

    match &config.state_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let store = JournaledStore::open(dir.join(PARTICIPANTS_JOURNAL))?;
            let audit = ScanLog::open(dir.join(SCANS_JOURNAL))?;
            info!(state_dir = %dir.display(), "Using journaled registry");
            run(&config, codec, store, audit).await
        }
        None => {
            warn!("SCAN_DESK_STATE_DIR not set; registry and audit log are in memory only");
            run(&config, codec, MemoryStore::new(), ScanLog::in_memory()).await
        }
    }
}

async fn run<S: ParticipantStore + 'static>(
    config: &Config,
    codec: QrCodec,
    store: S,
    audit: ScanLog,
) -> Result<(), Box<dyn Error>> {
    let processor = ScanProcessor::new(
        codec,
        Arc::new(store),
        Arc::new(audit),
        ChangeNotifier::new(config.event_buffer),
    )
    .with_store_timeout(config.store_timeout);

    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::new(processor), shutdown.clone());
    let router = server::build_router(state);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    server::serve(listener, router, shutdown).await?;
    info!("Server stopped");
    Ok(())
}
