//! Scout CRUD handlers.
//!
//! Create performs query extraction + source construction, initializes the
//! scout's state store, and spawns its engine. Get reads config + events.
//! Delete terminates the engine and wipes the store; it never errors.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use terascout_common::{ScoutConfig, TerascoutError};
use terascout_engine::sources::{build_search_source, fallback_plan};
use terascout_engine::{ScoutEngine, ScoutStore};

use crate::routes::AppState;

/// Upper bound on monitored query text.
const MAX_QUERY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScoutRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create_scout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScoutRequest>,
) -> axum::response::Response {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return bad_request("query must not be empty");
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return bad_request("query too long");
    }
    if !req.email.contains('@') {
        return bad_request("email must contain @");
    }

    let created_at = Utc::now();
    let expires_at = match req.expires_at {
        Some(at) => {
            if at <= created_at {
                return bad_request("expiresAt must be in the future");
            }
            if at > created_at + Duration::hours(state.settings.max_lifetime_hours) {
                return bad_request("expiresAt exceeds the maximum scout lifetime");
            }
            at
        }
        None => created_at + Duration::hours(state.settings.default_lifetime_hours),
    };

    // Query extraction; on model failure, fall back to the raw query with a
    // seven-day window.
    let plan = match state.analyst.plan_search(&query).await {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "Query extraction failed, using fallback plan");
            fallback_plan(&query)
        }
    };
    let source = build_search_source(&plan);

    let scout_id = Uuid::new_v4().to_string();
    let config = ScoutConfig {
        scout_id: scout_id.clone(),
        query,
        email: req.email.clone(),
        sources: vec![source],
        created_at,
        expires_at: Some(expires_at),
    };

    let store = match ScoutStore::create(&state.data_dir, &scout_id).await {
        Ok(store) => store.with_max_snapshot_text(state.settings.max_snapshot_text_length),
        Err(e) => {
            error!(error = %e, "Failed to initialize scout store");
            return internal_error();
        }
    };
    if let Err(e) = store.put_config(&config).await {
        error!(error = %e, "Failed to write scout config");
        return internal_error();
    }

    spawn_engine(&state, &scout_id, store).await;
    info!(scout_id = scout_id.as_str(), "Scout created");

    (StatusCode::CREATED, Json(json!({ "scoutId": scout_id }))).into_response()
}

pub async fn get_scout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if !valid_scout_id(&id) {
        return not_found(&id);
    }

    let store = match ScoutStore::open(&state.data_dir, &id).await {
        Ok(Some(store)) => store,
        Ok(None) => return not_found(&id),
        Err(e) => {
            error!(scout_id = id.as_str(), error = %e, "Failed to open scout store");
            return internal_error();
        }
    };

    let result = async {
        let config = store.get_config().await?;
        let events = store.list_events().await?;
        anyhow::Ok((config, events))
    }
    .await;
    store.close().await;

    match result {
        Ok((config, events)) => {
            Json(json!({ "config": config, "events": events })).into_response()
        }
        Err(e) if e.downcast_ref::<TerascoutError>().is_some_and(|e| matches!(e, TerascoutError::NotFound(_))) => {
            not_found(&id)
        }
        Err(e) => {
            error!(scout_id = id.as_str(), error = %e, "Failed to read scout");
            internal_error()
        }
    }
}

pub async fn delete_scout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    state.registry.abort(&id).await;

    if valid_scout_id(&id) {
        match ScoutStore::open(&state.data_dir, &id).await {
            Ok(Some(store)) => {
                if let Err(e) = store.wipe().await {
                    warn!(scout_id = id.as_str(), error = %e, "Wipe failed during delete");
                }
                store.close().await;
            }
            Ok(None) => {}
            Err(e) => warn!(scout_id = id.as_str(), error = %e, "Open failed during delete"),
        }
        if let Err(e) = ScoutStore::delete_file(&state.data_dir, &id) {
            warn!(scout_id = id.as_str(), error = %e, "File removal failed during delete");
        }
        info!(scout_id = id.as_str(), "Scout deleted");
    }

    Json(json!({ "ok": true, "scoutId": id })).into_response()
}

/// Spawn an engine task for a scout and track it in the registry.
pub async fn spawn_engine(state: &Arc<AppState>, scout_id: &str, store: ScoutStore) {
    let engine = ScoutEngine::new(
        scout_id,
        store,
        state.fetcher.clone(),
        state.analyst.clone(),
        state.mailer.clone(),
        state.settings.clone(),
        state.notify_from.clone(),
    );
    let id = scout_id.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            error!(scout_id = id.as_str(), error = %e, "Engine stopped with error");
        }
    });
    state.registry.insert(scout_id, handle).await;
}

fn valid_scout_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-')
}

fn bad_request(message: &str) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn not_found(id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown scout {id}") })),
    )
        .into_response()
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}
