use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use terascout_common::Config;
use terascout_engine::{ClaudeAnalyst, HttpFetcher, ScoutStore, SmtpMailer};
use terascout_server::{build_router, AppState, ScoutRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("terascout=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let analyst = ClaudeAnalyst::new(&config.anthropic_api_key)
        .with_max_ai_text(config.engine.max_ai_text_length);
    let mailer = SmtpMailer::new(&config.smtp_host, &config.smtp_user, &config.smtp_pass)?;

    let state = Arc::new(AppState {
        data_dir: config.data_dir.clone(),
        settings: config.engine.clone(),
        notify_from: config.notify_from.clone(),
        fetcher: Arc::new(HttpFetcher::new()),
        analyst: Arc::new(analyst),
        mailer: Arc::new(mailer),
        registry: ScoutRegistry::new(),
    });

    respawn_existing_scouts(&state).await;

    let app = build_router(state);
    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr = addr.as_str(), "Terascout control plane listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Respawn an engine for every store on disk whose scout has not expired.
/// Memoized steps make this safe: resumed engines replay completed work.
async fn respawn_existing_scouts(state: &Arc<AppState>) {
    let scout_ids = match ScoutStore::scan_data_dir(&state.data_dir) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Failed to scan data directory for scouts");
            return;
        }
    };

    for scout_id in scout_ids {
        let store = match ScoutStore::open(&state.data_dir, &scout_id).await {
            Ok(Some(store)) => {
                store.with_max_snapshot_text(state.settings.max_snapshot_text_length)
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(scout_id = scout_id.as_str(), error = %e, "Failed to reopen scout store");
                continue;
            }
        };
        match store.get_config().await {
            Ok(config) if config.is_expired(Utc::now()) => {
                info!(scout_id = scout_id.as_str(), "Skipping expired scout");
                store.close().await;
            }
            Ok(_) => {
                info!(scout_id = scout_id.as_str(), "Resuming scout engine");
                terascout_server::rest::scouts::spawn_engine(state, &scout_id, store).await;
            }
            Err(e) => {
                warn!(scout_id = scout_id.as_str(), error = %e, "Skipping scout with unreadable config");
                store.close().await;
            }
        }
    }
}
