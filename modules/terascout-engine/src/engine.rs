//! ScoutEngine — the durable polling loop that drives one scout from
//! creation to termination.
//!
//! Every side-effectful unit is a named step whose outcome is persisted
//! before the step returns (see `steps`). A restarted engine replays
//! completed steps from the memo, so a crash never re-sends an email or
//! re-runs a model call, and the end-of-cycle sleep resumes with its
//! remaining duration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use ai_client::truncate_to_char_boundary;
use terascout_common::{EngineSettings, ScoutConfig, ScoutEvent, ScoutSource, Snapshot};

use crate::analyst::{ChangeAnalysis, ChangeAnalyst};
use crate::fetcher::PageFetcher;
use crate::notify::{render_event_email, Mailer};
use crate::steps::StepRunner;
use crate::store::ScoutStore;

/// Extra attempts after the first failed fetch.
const FETCH_RETRIES: u32 = 2;
/// Hard cap on a single fetch attempt.
const FETCH_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra attempts after the first failed email send.
const EMAIL_RETRIES: u32 = 3;
/// In-process retries of a failed cycle before the engine gives up and
/// leaves resumption to a restart.
const CYCLE_RETRIES: u32 = 3;

pub struct ScoutEngine {
    scout_id: String,
    store: ScoutStore,
    steps: StepRunner,
    fetcher: Arc<dyn PageFetcher>,
    analyst: Arc<dyn ChangeAnalyst>,
    mailer: Arc<dyn Mailer>,
    settings: EngineSettings,
    notify_from: String,
}

enum CycleOutcome {
    Continue,
    Expired,
}

/// Outcome of a fetch step. `None` marks a permanent failure for the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FetchedPage {
    content_hash: String,
    text: String,
}

/// Outcome of a record-event step. The full event is memoized so the email
/// step renders identical content across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordedEvent {
    inserted: bool,
    event: ScoutEvent,
}

impl ScoutEngine {
    pub fn new(
        scout_id: impl Into<String>,
        store: ScoutStore,
        fetcher: Arc<dyn PageFetcher>,
        analyst: Arc<dyn ChangeAnalyst>,
        mailer: Arc<dyn Mailer>,
        settings: EngineSettings,
        notify_from: impl Into<String>,
    ) -> Self {
        let steps = StepRunner::new(store.clone());
        Self {
            scout_id: scout_id.into(),
            store,
            steps,
            fetcher,
            analyst,
            mailer,
            settings,
            notify_from: notify_from.into(),
        }
    }

    /// Run until expiration, the cycle cap, or an unrecoverable error.
    /// Restarting a partially-run engine resumes from the step memo.
    pub async fn run(&self) -> Result<()> {
        info!(scout_id = self.scout_id.as_str(), "Scout engine starting");

        for cycle in 0..self.settings.max_cycles {
            let mut attempts = 0u32;
            let outcome = loop {
                match self.run_cycle(cycle).await {
                    Ok(outcome) => break outcome,
                    Err(e) => {
                        attempts += 1;
                        if attempts > CYCLE_RETRIES {
                            error!(
                                scout_id = self.scout_id.as_str(),
                                cycle,
                                error = %e,
                                "Cycle retries exhausted, engine stopping"
                            );
                            return Err(e);
                        }
                        warn!(
                            scout_id = self.scout_id.as_str(),
                            cycle,
                            attempt = attempts,
                            error = %e,
                            "Cycle failed, retrying from memo"
                        );
                    }
                }
            };

            if let CycleOutcome::Expired = outcome {
                info!(scout_id = self.scout_id.as_str(), cycle, "Scout expired");
                return Ok(());
            }

            self.steps
                .sleep(&format!("wait-{cycle}"), self.settings.poll_interval)
                .await?;
        }

        info!(scout_id = self.scout_id.as_str(), "Cycle cap reached, engine finished");
        Ok(())
    }

    async fn run_cycle(&self, cycle: u32) -> Result<CycleOutcome> {
        let store = &self.store;

        let config: ScoutConfig = self
            .steps
            .run(&format!("load-config-{cycle}"), || async {
                store.get_config().await
            })
            .await?;

        if config.is_expired(Utc::now()) {
            return Ok(CycleOutcome::Expired);
        }

        let email_count: u32 = self
            .steps
            .run(&format!("email-count-{cycle}"), || async {
                Ok(store.get_email_count().await?.count)
            })
            .await?;
        let can_email = email_count < self.settings.max_emails_per_scout_per_day;

        for source in &config.sources {
            self.poll_source(cycle, source, &config, can_email).await?;
        }

        Ok(CycleOutcome::Continue)
    }

    async fn poll_source(
        &self,
        cycle: u32,
        source: &ScoutSource,
        config: &ScoutConfig,
        can_email: bool,
    ) -> Result<()> {
        let label = source.label.as_str();
        let store = &self.store;

        let fetched: Option<FetchedPage> = self
            .steps
            .run(&format!("fetch-{cycle}-{label}"), || async {
                Ok(self.fetch_with_retry(&source.url).await)
            })
            .await?;
        let Some(fetched) = fetched else {
            warn!(
                scout_id = self.scout_id.as_str(),
                url = source.url.as_str(),
                "Fetch failed permanently, skipping source this cycle"
            );
            return Ok(());
        };

        let prev: Option<Snapshot> = self
            .steps
            .run(&format!("snapshot-{cycle}-{label}"), || async {
                store.get_snapshot(&source.url).await
            })
            .await?;
        let is_baseline = Snapshot::is_baseline(prev.as_ref());

        self.steps
            .run(&format!("save-snapshot-{cycle}-{label}"), || async {
                store
                    .put_snapshot(&source.url, &fetched.content_hash, &fetched.text)
                    .await
            })
            .await?;

        if is_baseline {
            info!(scout_id = self.scout_id.as_str(), label, "Baseline snapshot established");
            return Ok(());
        }
        let Some(prev) = prev else {
            return Ok(());
        };

        // The hash comparison is advisory: equal-hash pairs still go to the
        // analyzer, which reliably answers "no event" for them.
        let analysis: ChangeAnalysis = self
            .steps
            .run(&format!("analyze-{cycle}-{label}"), || async {
                let old = truncate_to_char_boundary(&prev.text, self.settings.max_ai_text_length);
                let new =
                    truncate_to_char_boundary(&fetched.text, self.settings.max_ai_text_length);
                self.analyst.analyze(old, new, &config.query).await
            })
            .await?;

        if !analysis.is_event {
            return Ok(());
        }

        let duplicate: bool = self
            .steps
            .run(&format!("dedupe-{cycle}-{label}"), || async {
                let recent: Vec<String> = store
                    .list_events()
                    .await?
                    .into_iter()
                    .take(self.settings.dedupe_lookback)
                    .map(|e| e.summary)
                    .collect();
                if recent.is_empty() {
                    return Ok(false);
                }
                match self.analyst.is_duplicate(&analysis.summary, &recent).await {
                    Ok(verdict) => Ok(verdict),
                    Err(e) => {
                        warn!(error = %e, "Dedup call failed, treating candidate as new");
                        Ok(false)
                    }
                }
            })
            .await?;
        if duplicate {
            info!(scout_id = self.scout_id.as_str(), label, "Candidate suppressed as duplicate");
            return Ok(());
        }

        let event_id: String = self
            .steps
            .run(&format!("hash-event-{cycle}-{label}"), || async {
                Ok(event_id_for(
                    &source.url,
                    &prev.content_hash,
                    &fetched.content_hash,
                ))
            })
            .await?;

        let recorded: RecordedEvent = self
            .steps
            .run(&format!("record-event-{cycle}-{label}"), || async {
                let event = ScoutEvent {
                    event_id: event_id.clone(),
                    source_url: source.url.clone(),
                    source_label: source.label.clone(),
                    tldr: analysis.tldr.clone(),
                    summary: analysis.summary.clone(),
                    highlights: analysis.highlights.clone(),
                    articles: analysis.articles.clone(),
                    is_breaking: analysis.is_breaking,
                    detected_at: Utc::now(),
                    notified: false,
                };
                let inserted = store.record_event(&event).await?;
                Ok(RecordedEvent { inserted, event })
            })
            .await?;

        if recorded.inserted && can_email {
            let daily_count: u32 = self
                .steps
                .run(&format!("email-{cycle}-{label}"), || async {
                    let (subject, html) = render_event_email(&recorded.event);
                    self.send_with_retry(&config.email, &subject, &html).await?;
                    store.mark_notified(&recorded.event.event_id).await?;
                    store.increment_email_count().await
                })
                .await?;
            info!(
                scout_id = self.scout_id.as_str(),
                label,
                daily_count,
                "Notification dispatched"
            );
        } else if recorded.inserted {
            // Deliberate: the event stays visible in the log with
            // notified = false, and no later cycle retries the email.
            info!(
                scout_id = self.scout_id.as_str(),
                label, "Event recorded but daily email limit reached"
            );
        }

        Ok(())
    }

    async fn fetch_with_retry(&self, url: &str) -> Option<FetchedPage> {
        for attempt in 0..=FETCH_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(self.settings.fetch_retry_delay).await;
            }
            match tokio::time::timeout(FETCH_ATTEMPT_TIMEOUT, self.fetcher.fetch(url)).await {
                Ok(Ok(text)) => {
                    return Some(FetchedPage {
                        content_hash: sha256_hex(&text),
                        text,
                    })
                }
                Ok(Err(e)) => warn!(url, attempt, error = %e, "Fetch attempt failed"),
                Err(_) => warn!(url, attempt, "Fetch attempt timed out"),
            }
        }
        None
    }

    async fn send_with_retry(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let mut delay = self.settings.email_retry_base;
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 0..=EMAIL_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            match self.mailer.send(&self.notify_from, to, subject, html).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(to, attempt, error = %e, "Email send failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(|e| e.context("Email retries exhausted"))
            .unwrap_or_else(|| anyhow!("Email retries exhausted")))
    }
}

/// The content-derived idempotency key for a detected transition.
pub fn event_id_for(source_url: &str, old_hash: &str, new_hash: &str) -> String {
    sha256_hex(&format!("{source_url}|{old_hash}|{new_hash}"))
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn event_id_concatenates_with_pipes() {
        let id = event_id_for("https://s", "old", "new");
        assert_eq!(id, sha256_hex("https://s|old|new"));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
