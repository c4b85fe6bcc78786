//! End-to-end engine scenarios over mock fetcher/analyst/mailer and
//! file-backed stores: baseline handling, dedup suppression, the daily email
//! gate, expiration, fetch failure, and restart-resume semantics.

use std::sync::Arc;

use chrono::Utc;

use terascout_common::EngineSettings;
use terascout_engine::engine::{event_id_for, sha256_hex};
use terascout_engine::testing::{event_analysis, fast_settings, scout_config, MockAnalyst, MockFetcher, MockMailer};
use terascout_engine::{ScoutEngine, ScoutStore};

const SOURCE_URL: &str = "https://news.google.com/search?q=nvidia+gpu+drops+when%3A7d";
const FROM: &str = "scout@terascout.dev";

async fn store_for(dir: &tempfile::TempDir, scout_id: &str) -> ScoutStore {
    let store = ScoutStore::create(dir.path(), scout_id).await.unwrap();
    store
        .put_config(&scout_config(
            scout_id,
            "NVIDIA GPU drops",
            "u@e.com",
            SOURCE_URL,
            Some(Utc::now() + chrono::Duration::hours(72)),
        ))
        .await
        .unwrap();
    store
}

fn engine(
    scout_id: &str,
    store: &ScoutStore,
    fetcher: Arc<MockFetcher>,
    analyst: Arc<MockAnalyst>,
    mailer: Arc<MockMailer>,
    settings: EngineSettings,
) -> ScoutEngine {
    ScoutEngine::new(
        scout_id,
        store.clone(),
        fetcher,
        analyst,
        mailer,
        settings,
        FROM,
    )
}

// ---------------------------------------------------------------------------
// Scenario: baseline, re-render, new story, then duplicate suppression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn baseline_then_new_story_then_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&dir, "s-story").await;

    // Cycle 0: baseline "A". Cycle 1: "A" again (equal hashes, analyzer
    // still consulted). Cycle 2: "B" — a real event. Cycle 3: "B2" — a
    // paraphrase the dedup model rejects.
    let fetcher = Arc::new(
        MockFetcher::new()
            .on_text(SOURCE_URL, "A")
            .on_text(SOURCE_URL, "A")
            .on_text(SOURCE_URL, "B")
            .on_text(SOURCE_URL, "B2"),
    );
    let analyst = Arc::new(
        MockAnalyst::new()
            .on_analysis(terascout_engine::ChangeAnalysis::no_event())
            .on_analysis(event_analysis("RTX 5090 in stock", "RTX 5090 in stock"))
            .on_analysis(event_analysis(
                "RTX 5090 now available",
                "RTX 5090 now available",
            ))
            .on_duplicate(true),
    );
    let mailer = Arc::new(MockMailer::new());

    engine(
        "s-story",
        &store,
        fetcher.clone(),
        analyst.clone(),
        mailer.clone(),
        fast_settings(4),
    )
    .run()
    .await
    .unwrap();

    // Baseline never reaches the analyzer; the three later cycles do.
    assert_eq!(
        analyst
            .analyze_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        3
    );
    // Cycle 2's candidate had no prior events, so only cycle 3 consulted
    // the dedup model.
    assert_eq!(
        analyst
            .dedupe_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    let events = store.list_events().await.unwrap();
    assert_eq!(events.len(), 1, "duplicate must not be recorded");
    assert_eq!(
        events[0].event_id,
        event_id_for(SOURCE_URL, &sha256_hex("A"), &sha256_hex("B"))
    );
    assert!(events[0].notified);

    assert_eq!(mailer.sent_count(), 1);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent[0].to, "u@e.com");
    assert_eq!(sent[0].subject, "RTX 5090 in stock");
    assert_eq!(store.get_email_count().await.unwrap().count, 1);

    // Snapshot reflects the last fetch.
    let snap = store.get_snapshot(SOURCE_URL).await.unwrap().unwrap();
    assert_eq!(snap.content_hash, sha256_hex("B2"));
}

// ---------------------------------------------------------------------------
// Scenario: daily rate limit — events beyond the gate stay unnotified
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_events_are_recorded_without_email() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&dir, "s-limit").await;

    let fetcher = Arc::new(
        MockFetcher::new()
            .on_text(SOURCE_URL, "A")
            .on_text(SOURCE_URL, "B")
            .on_text(SOURCE_URL, "C")
            .on_text(SOURCE_URL, "D"),
    );
    let analyst = Arc::new(
        MockAnalyst::new()
            .on_analysis(event_analysis("first", "first story"))
            .on_analysis(event_analysis("second", "second story"))
            .on_analysis(event_analysis("third", "third story"))
            .on_duplicate(false)
            .on_duplicate(false),
    );
    let mailer = Arc::new(MockMailer::new());

    let mut settings = fast_settings(4);
    settings.max_emails_per_scout_per_day = 2;

    engine(
        "s-limit",
        &store,
        fetcher,
        analyst,
        mailer.clone(),
        settings,
    )
    .run()
    .await
    .unwrap();

    let events = store.list_events().await.unwrap();
    assert_eq!(events.len(), 3, "the gated event still reaches the log");
    assert_eq!(mailer.sent_count(), 2);
    assert_eq!(store.get_email_count().await.unwrap().count, 2);

    let gated_id = event_id_for(SOURCE_URL, &sha256_hex("C"), &sha256_hex("D"));
    let gated = events.iter().find(|e| e.event_id == gated_id).unwrap();
    assert!(!gated.notified);
    for event in events.iter().filter(|e| e.event_id != gated_id) {
        assert!(event.notified);
    }
}

// ---------------------------------------------------------------------------
// Scenario: expiration observed before any fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_scout_exits_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScoutStore::create(dir.path(), "s-expired").await.unwrap();
    store
        .put_config(&scout_config(
            "s-expired",
            "anything",
            "u@e.com",
            SOURCE_URL,
            Some(Utc::now()),
        ))
        .await
        .unwrap();

    let fetcher = Arc::new(MockFetcher::new());
    let analyst = Arc::new(MockAnalyst::new());
    let mailer = Arc::new(MockMailer::new());

    engine(
        "s-expired",
        &store,
        fetcher.clone(),
        analyst,
        mailer.clone(),
        fast_settings(4),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(fetcher.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(store.list_events().await.unwrap().is_empty());
    assert!(store.get_snapshot(SOURCE_URL).await.unwrap().is_none());
    assert_eq!(mailer.sent_count(), 0);
}

// ---------------------------------------------------------------------------
// Scenario: fetch failure skips the source and retains the snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_skips_cycle_and_keeps_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&dir, "s-fetchfail").await;

    let fetcher = Arc::new(
        MockFetcher::new()
            .on_text(SOURCE_URL, "A")
            .on_failed_step(SOURCE_URL)
            .on_text(SOURCE_URL, "A"),
    );
    let analyst = Arc::new(MockAnalyst::new());
    let mailer = Arc::new(MockMailer::new());

    engine(
        "s-fetchfail",
        &store,
        fetcher.clone(),
        analyst.clone(),
        mailer.clone(),
        fast_settings(3),
    )
    .run()
    .await
    .unwrap();

    // 1 baseline attempt + 3 failing attempts + 1 recovery attempt.
    assert_eq!(fetcher.calls.load(std::sync::atomic::Ordering::SeqCst), 5);
    assert!(store.list_events().await.unwrap().is_empty());
    assert_eq!(mailer.sent_count(), 0);

    // The failed cycle left the baseline snapshot untouched; the recovery
    // cycle analyzed the equal-hash pair.
    let snap = store.get_snapshot(SOURCE_URL).await.unwrap().unwrap();
    assert_eq!(snap.content_hash, sha256_hex("A"));
    assert_eq!(
        analyst
            .analyze_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ---------------------------------------------------------------------------
// Scenario: restart mid-cycle — memoized steps replay, the email sends once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restart_resumes_from_memo_without_repeating_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let scout_id = "s-restart";
    let store = store_for(&dir, scout_id).await;

    // First process: cycle 0 establishes the baseline, cycle 1 detects an
    // event but every SMTP attempt fails, so the cycle exhausts its retries
    // and the engine dies mid-cycle.
    let fetcher_a = Arc::new(
        MockFetcher::new()
            .on_text(SOURCE_URL, "A")
            .on_text(SOURCE_URL, "B"),
    );
    let analyst_a = Arc::new(
        MockAnalyst::new().on_analysis(event_analysis("big news", "big news summary")),
    );
    let mailer_a = Arc::new(MockMailer::failing(100));

    let result = engine(
        scout_id,
        &store,
        fetcher_a,
        analyst_a.clone(),
        mailer_a.clone(),
        fast_settings(2),
    )
    .run()
    .await;
    assert!(result.is_err(), "engine dies when email retries exhaust");

    // The event was recorded before the email step; the send/count pair
    // stays atomic, so neither happened.
    assert_eq!(store.list_events().await.unwrap().len(), 1);
    assert!(!store.list_events().await.unwrap()[0].notified);
    assert_eq!(store.get_email_count().await.unwrap().count, 0);
    assert_eq!(
        analyst_a
            .analyze_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1,
        "cycle retries replay the analyze step from the memo"
    );
    store.close().await;

    // Second process: same store, healthy mailer, no scripted fetches or
    // analyses — everything except the email step must replay from the memo.
    let store = ScoutStore::open(dir.path(), scout_id).await.unwrap().unwrap();
    let fetcher_b = Arc::new(MockFetcher::new());
    let analyst_b = Arc::new(MockAnalyst::new());
    let mailer_b = Arc::new(MockMailer::new());

    engine(
        scout_id,
        &store,
        fetcher_b.clone(),
        analyst_b.clone(),
        mailer_b.clone(),
        fast_settings(2),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        fetcher_b.calls.load(std::sync::atomic::Ordering::SeqCst),
        0,
        "fetch steps replay from the memo"
    );
    assert_eq!(
        analyst_b
            .analyze_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0,
        "model calls replay from the memo"
    );
    assert_eq!(mailer_b.sent_count(), 1, "exactly one email after resume");

    let events = store.list_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].notified);
    assert_eq!(store.get_email_count().await.unwrap().count, 1);
}
