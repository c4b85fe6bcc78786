//! Test mocks for the scout engine.
//!
//! Three mocks matching the three trait boundaries:
//! - MockFetcher (PageFetcher) — scripted per-attempt responses per URL
//! - MockAnalyst (ChangeAnalyst) — scripted analyses + dedup verdicts
//! - MockMailer (Mailer) — records sends, optionally fails the first N
//!
//! Plus helpers for constructing configs and engine settings with
//! test-friendly durations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use terascout_common::{EngineSettings, ScoutConfig, ScoutSource, SourceStrategy};

use crate::analyst::{ChangeAnalysis, ChangeAnalyst, SearchPlan};
use crate::fetcher::PageFetcher;
use crate::notify::Mailer;
use crate::sources::TimeWindow;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Engine settings with millisecond pacing so scenario tests finish fast.
/// Behavior-relevant defaults (limits, truncation, lookback) are unchanged.
pub fn fast_settings(max_cycles: u32) -> EngineSettings {
    EngineSettings {
        poll_interval: Duration::from_millis(5),
        fetch_retry_delay: Duration::from_millis(1),
        email_retry_base: Duration::from_millis(1),
        max_cycles,
        ..EngineSettings::default()
    }
}

pub fn scout_config(
    scout_id: &str,
    query: &str,
    email: &str,
    source_url: &str,
    expires_at: Option<DateTime<Utc>>,
) -> ScoutConfig {
    ScoutConfig {
        scout_id: scout_id.to_string(),
        query: query.to_string(),
        email: email.to_string(),
        sources: vec![ScoutSource {
            url: source_url.to_string(),
            label: "test-source".to_string(),
            strategy: SourceStrategy::HtmlDiff,
        }],
        created_at: Utc::now(),
        expires_at,
    }
}

/// A positive analysis with the given summary.
pub fn event_analysis(tldr: &str, summary: &str) -> ChangeAnalysis {
    ChangeAnalysis {
        is_event: true,
        tldr: tldr.to_string(),
        summary: summary.to_string(),
        highlights: vec![],
        articles: vec![],
        is_breaking: false,
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

pub enum FetchScript {
    Text(String),
    Fail,
}

/// Scripted fetcher. Each queue entry feeds exactly one fetch *attempt* for
/// its URL; the engine makes three attempts per failing fetch step, so a
/// permanently failing cycle consumes three `Fail` entries. An exhausted
/// queue errors.
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<FetchScript>>>,
    pub calls: AtomicU32,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn on_text(self, url: &str, text: &str) -> Self {
        self.push(url, FetchScript::Text(text.to_string()));
        self
    }

    /// One failing attempt. Push three for a whole failing fetch step.
    pub fn on_failure(self, url: &str) -> Self {
        self.push(url, FetchScript::Fail);
        self
    }

    pub fn on_failed_step(self, url: &str) -> Self {
        self.on_failure(url).on_failure(url).on_failure(url)
    }

    fn push(&self, url: &str, script: FetchScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        match script {
            Some(FetchScript::Text(text)) => Ok(text),
            Some(FetchScript::Fail) => bail!("scripted fetch failure for {url}"),
            None => bail!("no scripted response left for {url}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockAnalyst
// ---------------------------------------------------------------------------

/// Scripted analyst. `analyze` pops the next analysis (default: no event);
/// `is_duplicate` pops the next verdict (default: not a duplicate).
pub struct MockAnalyst {
    plan: SearchPlan,
    analyses: Mutex<VecDeque<ChangeAnalysis>>,
    duplicates: Mutex<VecDeque<bool>>,
    pub analyze_calls: AtomicU32,
    pub dedupe_calls: AtomicU32,
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self {
            plan: SearchPlan {
                phrase: "test phrase".to_string(),
                window: TimeWindow::SevenDays,
            },
            analyses: Mutex::new(VecDeque::new()),
            duplicates: Mutex::new(VecDeque::new()),
            analyze_calls: AtomicU32::new(0),
            dedupe_calls: AtomicU32::new(0),
        }
    }

    pub fn with_plan(mut self, plan: SearchPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn on_analysis(self, analysis: ChangeAnalysis) -> Self {
        self.analyses.lock().unwrap().push_back(analysis);
        self
    }

    pub fn on_duplicate(self, verdict: bool) -> Self {
        self.duplicates.lock().unwrap().push_back(verdict);
        self
    }
}

impl Default for MockAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeAnalyst for MockAnalyst {
    async fn plan_search(&self, _raw_query: &str) -> Result<SearchPlan> {
        Ok(self.plan.clone())
    }

    async fn analyze(
        &self,
        _old_text: &str,
        _new_text: &str,
        _query: &str,
    ) -> Result<ChangeAnalysis> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .analyses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ChangeAnalysis::no_event))
    }

    async fn is_duplicate(&self, _candidate: &str, _recent: &[String]) -> Result<bool> {
        self.dedupe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.duplicates.lock().unwrap().pop_front().unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// MockMailer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Records every send. `failing(n)` makes the first `n` sends error, which
/// exercises the email retry/abort path.
pub struct MockMailer {
    pub sent: Mutex<Vec<SentEmail>>,
    fail_remaining: AtomicU32,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_remaining: AtomicU32::new(0),
        }
    }

    pub fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_remaining: AtomicU32::new(times),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            bail!("scripted SMTP failure");
        }
        self.sent.lock().unwrap().push(SentEmail {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}
