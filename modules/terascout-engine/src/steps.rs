//! StepRunner — named, memoized execution units.
//!
//! Each step's outcome is persisted in the scout's own store before the step
//! returns; on restart a completed step replays its recorded outcome instead
//! of re-executing side effects. Sleeps persist their wake deadline, so a
//! crash mid-sleep resumes with the remaining duration, not from zero.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::store::ScoutStore;

#[derive(Clone)]
pub struct StepRunner {
    store: ScoutStore,
}

impl StepRunner {
    pub fn new(store: ScoutStore) -> Self {
        Self { store }
    }

    /// Execute a step once. A previously completed step returns its recorded
    /// outcome without running `f` again.
    pub async fn run<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(saved) = self.store.step_outcome(name).await? {
            debug!(step = name, "Replaying recorded step outcome");
            return serde_json::from_str(&saved)
                .with_context(|| format!("Corrupt outcome recorded for step {name}"));
        }

        let outcome = f().await?;
        let json = serde_json::to_string(&outcome)
            .with_context(|| format!("Unserializable outcome for step {name}"))?;
        self.store.record_step(name, &json).await?;
        Ok(outcome)
    }

    /// Durable sleep. The wake deadline is persisted on first entry; resumed
    /// runs sleep only the remaining duration. Completed sleeps return
    /// immediately.
    pub async fn sleep(&self, name: &str, duration: Duration) -> Result<()> {
        if self.store.sleep_finished(name).await? {
            return Ok(());
        }

        let wake_at = match self.store.sleep_deadline(name).await? {
            Some(at) => at,
            None => {
                let at = Utc::now()
                    + chrono::Duration::from_std(duration)
                        .context("Sleep duration out of range")?;
                self.store.set_sleep_deadline(name, at).await?;
                at
            }
        };

        let remaining = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining > Duration::ZERO {
            debug!(step = name, remaining_ms = remaining.as_millis() as u64, "Durable sleep");
            tokio::time::sleep(remaining).await;
        }
        self.store.finish_sleep(name).await
    }
}
