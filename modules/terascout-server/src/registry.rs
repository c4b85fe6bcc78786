//! Registry of running scout engine tasks, keyed by scout id.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// One engine task per scout. Engines are mutually isolated; the registry
/// only tracks handles so delete can terminate them.
#[derive(Default)]
pub struct ScoutRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ScoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a running engine. A replaced handle (same scout id) is aborted.
    pub async fn insert(&self, scout_id: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(scout_id.to_string(), handle) {
            old.abort();
        }
    }

    /// Terminate the engine for a scout. No-op when absent.
    pub async fn abort(&self, scout_id: &str) {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.remove(scout_id) {
            handle.abort();
            info!(scout_id, "Engine task aborted");
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
