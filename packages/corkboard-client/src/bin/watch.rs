//! corkboard-watch: follow a board (or the dashboard) and log every change.
//!
//! Usage: corkboard-watch [board-id]

use std::sync::Arc;

use corkboard_client::{default_config_path, load_effective_config, logging, HttpBoardApi, SignalRTransport};
use corkboard_core::realtime::PushTransport;
use corkboard_core::types::{Board, BoardList};
use corkboard_core::{BoardApi, BoardSession, DashboardSession, Notice};
use tokio::sync::broadcast;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

const TARGET: &str = "corkboard.watch";

fn describe_board(board: &Board) -> String {
    let active: usize = board.columns.iter().map(|c| c.active_cards().count()).sum();
    format!(
        "'{}': {} columns, {} active cards, {} labels",
        board.title,
        board.columns.len(),
        active,
        board.labels.len()
    )
}

fn describe_dashboard(boards: &BoardList) -> String {
    let favorites = boards.0.iter().filter(|b| b.is_favorite).count();
    format!("{} boards ({} favorites)", boards.len(), favorites)
}

async fn log_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => log::warn!(target: TARGET, "Notice: {:?}", notice),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::debug!(target: TARGET, "Skipped {} notices", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn watch_board(
    api: Arc<dyn BoardApi>,
    transport: Arc<dyn PushTransport>,
    board_id: &str,
    config: &corkboard_core::ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = BoardSession::new(api, board_id, config);
    let notices = tokio::spawn(log_notices(session.notices()));
    session.mount(Some(transport)).await?;

    let mut changes = WatchStream::new(session.subscribe());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = changes.next() => {
                let Some(snapshot) = snapshot else { break };
                if snapshot.is_loaded() {
                    log::info!(target: TARGET, "v{} {}", snapshot.version, describe_board(&snapshot.data));
                }
            }
        }
    }

    session.unmount();
    notices.abort();
    Ok(())
}

async fn watch_dashboard(
    api: Arc<dyn BoardApi>,
    transport: Arc<dyn PushTransport>,
    config: &corkboard_core::ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = DashboardSession::new(api, config);
    let notices = tokio::spawn(log_notices(session.notices()));
    session.mount(Some(transport)).await?;

    let mut changes = WatchStream::new(session.subscribe());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = changes.next() => {
                let Some(snapshot) = snapshot else { break };
                if snapshot.is_loaded() {
                    log::info!(target: TARGET, "v{} {}", snapshot.version, describe_dashboard(&snapshot.data));
                }
            }
        }
    }

    session.unmount();
    notices.abort();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config_path = default_config_path();
    let config = load_effective_config(&config_path);
    log::info!(target: TARGET, "Using store at {}", config.api_url);

    let api: Arc<dyn BoardApi> = match HttpBoardApi::new(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            log::error!(target: TARGET, "Cannot build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let transport: Arc<dyn PushTransport> = Arc::new(SignalRTransport::new(config.resolved_hub_url()));

    let result = match std::env::args().nth(1) {
        Some(board_id) => watch_board(api, transport, &board_id, &config).await,
        None => watch_dashboard(api, transport, &config).await,
    };
    if let Err(e) = result {
        log::error!(target: TARGET, "{}", e);
        std::process::exit(1);
    }
}
