//! The three language-model calls a scout makes: query extraction at
//! creation, change analysis per cycle, and semantic dedup per candidate
//! event.
//!
//! Model output is untrusted input. Every response is reduced to its first
//! balanced `{…}` substring, validated by shape, and clamped before it can
//! reach persistent storage. Anything unparseable yields the documented safe
//! default: no event, not a duplicate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ai_client::{extract_json_object, truncate_to_char_boundary, Claude};
use terascout_common::EventArticle;

use crate::sources::TimeWindow;

const ANALYST_MODEL: &str = "claude-haiku-4-5-20251001";

/// Word cap on the one-line event description.
const MAX_TLDR_WORDS: usize = 15;
const MAX_HIGHLIGHTS: usize = 5;
const MAX_ARTICLES: usize = 10;
const MAX_PHRASE_WORDS: usize = 7;
const MAX_SUMMARY_BYTES: usize = 2_000;
const MAX_FIELD_BYTES: usize = 500;

// --- Outputs ---

/// Search terms extracted from a raw query, plus its time sensitivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub phrase: String,
    pub window: TimeWindow,
}

/// What the change analyzer concluded about an old/new text pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub is_event: bool,
    pub tldr: String,
    pub summary: String,
    pub highlights: Vec<String>,
    pub articles: Vec<EventArticle>,
    pub is_breaking: bool,
}

impl ChangeAnalysis {
    /// The safe default: nothing meaningful changed.
    pub fn no_event() -> Self {
        Self::default()
    }
}

// --- ChangeAnalyst trait ---

#[async_trait]
pub trait ChangeAnalyst: Send + Sync {
    /// Extract a 2–7-word search phrase and time window from a raw query.
    /// Errors here are recoverable: callers fall back to the raw query.
    async fn plan_search(&self, raw_query: &str) -> Result<SearchPlan>;

    /// Judge whether the new text carries substantively new content relative
    /// to the old. Malformed model output is `no_event`, not an error.
    async fn analyze(&self, old_text: &str, new_text: &str, query: &str)
        -> Result<ChangeAnalysis>;

    /// Whether a candidate summary restates any of the recent ones.
    async fn is_duplicate(&self, candidate: &str, recent: &[String]) -> Result<bool>;
}

// --- Claude-backed analyst ---

pub struct ClaudeAnalyst {
    claude: Claude,
    max_ai_text: usize,
}

impl ClaudeAnalyst {
    pub fn new(anthropic_api_key: &str) -> Self {
        Self {
            claude: Claude::new(anthropic_api_key, ANALYST_MODEL),
            max_ai_text: 2_500,
        }
    }

    pub fn with_max_ai_text(mut self, max_bytes: usize) -> Self {
        self.max_ai_text = max_bytes;
        self
    }
}

#[async_trait]
impl ChangeAnalyst for ClaudeAnalyst {
    async fn plan_search(&self, raw_query: &str) -> Result<SearchPlan> {
        let user = format!(
            "Extract news search terms from this monitoring request.\n\
             \n\
             Request: {raw_query}\n\
             \n\
             Respond with only a JSON object:\n\
             {{\"phrase\": \"2 to 7 search words\", \"window\": \"1d\" | \"7d\" | \"30d\" | \"none\"}}\n\
             \n\
             Pick the window from how time-sensitive the request is: breaking \
             topics get \"1d\", ongoing stories \"7d\" or \"30d\", evergreen \
             topics \"none\"."
        );
        let response = self
            .claude
            .chat_completion("You turn monitoring requests into news search queries.", user)
            .await?;

        parse_plan(&response).ok_or_else(|| anyhow!("Unparseable search plan: {response:?}"))
    }

    async fn analyze(
        &self,
        old_text: &str,
        new_text: &str,
        query: &str,
    ) -> Result<ChangeAnalysis> {
        let old_text = truncate_to_char_boundary(old_text, self.max_ai_text);
        let new_text = truncate_to_char_boundary(new_text, self.max_ai_text);
        let user = format!(
            "A user is monitoring news for: {query}\n\
             \n\
             PREVIOUS page text:\n{old_text}\n\
             \n\
             CURRENT page text:\n{new_text}\n\
             \n\
             Did substantively new content relevant to the request appear? \
             Page re-renders, reordering, ads, and timestamps are not events.\n\
             \n\
             Respond with only a JSON object:\n\
             {{\"isEvent\": bool, \"tldr\": \"<= 15 words\", \"summary\": \"2-4 sentences\", \
             \"highlights\": [\"up to 5 short strings\"], \
             \"articles\": [{{\"title\": \"\", \"url\": \"\", \"snippet\": \"\", \"imageUrl\": null}}], \
             \"isBreaking\": bool}}"
        );
        let response = self
            .claude
            .chat_completion(
                "You detect meaningful changes between two snapshots of a news search page.",
                user,
            )
            .await?;

        Ok(parse_analysis(&response))
    }

    async fn is_duplicate(&self, candidate: &str, recent: &[String]) -> Result<bool> {
        let numbered: String = recent
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}\n", i + 1))
            .collect();
        let user = format!(
            "Already notified about:\n{numbered}\n\
             New candidate:\n{candidate}\n\
             \n\
             Is the candidate a restatement of any story above?\n\
             Respond with only a JSON object: {{\"isDuplicate\": bool}}"
        );
        let response = self
            .claude
            .chat_completion(
                "You decide whether a news summary repeats an earlier notification.",
                user,
            )
            .await?;

        Ok(parse_duplicate(&response))
    }
}

// --- Response parsing (untrusted input) ---

#[derive(Deserialize)]
struct PlanWire {
    #[serde(default)]
    phrase: String,
    #[serde(default)]
    window: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisWire {
    #[serde(default)]
    is_event: bool,
    #[serde(default)]
    tldr: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    articles: Vec<ArticleWire>,
    #[serde(default)]
    is_breaking: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleWire {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateWire {
    #[serde(default)]
    is_duplicate: bool,
}

/// Parse a search plan. `None` when the response holds no usable object —
/// callers fall back to the raw query.
pub fn parse_plan(response: &str) -> Option<SearchPlan> {
    let json = extract_json_object(response)?;
    let wire: PlanWire = serde_json::from_str(json).ok()?;
    let phrase = clamp_words(wire.phrase.trim(), MAX_PHRASE_WORDS);
    if phrase.is_empty() {
        return None;
    }
    Some(SearchPlan {
        phrase,
        window: TimeWindow::from_token(&wire.window),
    })
}

/// Parse a change analysis, clamping every field before it can reach
/// storage. Malformed responses are the no-event analysis.
pub fn parse_analysis(response: &str) -> ChangeAnalysis {
    let Some(json) = extract_json_object(response) else {
        warn!("Analyzer response held no JSON object, treating as no event");
        return ChangeAnalysis::no_event();
    };
    let wire: AnalysisWire = match serde_json::from_str(json) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(error = %e, "Malformed analyzer response, treating as no event");
            return ChangeAnalysis::no_event();
        }
    };

    ChangeAnalysis {
        is_event: wire.is_event,
        tldr: clamp_words(wire.tldr.trim(), MAX_TLDR_WORDS),
        summary: truncate_to_char_boundary(wire.summary.trim(), MAX_SUMMARY_BYTES).to_string(),
        highlights: wire
            .highlights
            .into_iter()
            .map(|h| truncate_to_char_boundary(h.trim(), MAX_FIELD_BYTES).to_string())
            .filter(|h| !h.is_empty())
            .take(MAX_HIGHLIGHTS)
            .collect(),
        articles: wire
            .articles
            .into_iter()
            .take(MAX_ARTICLES)
            .map(|a| EventArticle {
                title: truncate_to_char_boundary(a.title.trim(), MAX_FIELD_BYTES).to_string(),
                url: truncate_to_char_boundary(a.url.trim(), MAX_FIELD_BYTES).to_string(),
                snippet: truncate_to_char_boundary(a.snippet.trim(), MAX_FIELD_BYTES).to_string(),
                image_url: a
                    .image_url
                    .map(|u| truncate_to_char_boundary(u.trim(), MAX_FIELD_BYTES).to_string()),
            })
            .collect(),
        is_breaking: wire.is_breaking,
    }
}

/// Parse a dedup verdict. Malformed responses are "not a duplicate" — a
/// false positive notification beats a silent drop.
pub fn parse_duplicate(response: &str) -> bool {
    extract_json_object(response)
        .and_then(|json| serde_json::from_str::<DuplicateWire>(json).ok())
        .map(|wire| wire.is_duplicate)
        .unwrap_or(false)
}

fn clamp_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
