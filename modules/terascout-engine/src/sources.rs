//! Source construction: turn an extracted search plan into the single
//! polling target a scout watches.

use serde::{Deserialize, Serialize};
use url::Url;

use terascout_common::{ScoutSource, SourceStrategy};

use crate::analyst::SearchPlan;

const NEWS_SEARCH_BASE: &str = "https://news.google.com/search";

/// Fallback phrases keep at most this many bytes of the raw query.
const MAX_FALLBACK_PHRASE_BYTES: usize = 100;

/// Time sensitivity of a query, mapped to a `when:` search token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    OneDay,
    SevenDays,
    ThirtyDays,
    Unbounded,
}

impl TimeWindow {
    pub fn token(&self) -> Option<&'static str> {
        match self {
            TimeWindow::OneDay => Some("1d"),
            TimeWindow::SevenDays => Some("7d"),
            TimeWindow::ThirtyDays => Some("30d"),
            TimeWindow::Unbounded => None,
        }
    }

    /// Lenient parse of a model-provided window token. Anything unrecognized
    /// means no window.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "1d" => TimeWindow::OneDay,
            "7d" => TimeWindow::SevenDays,
            "30d" => TimeWindow::ThirtyDays,
            _ => TimeWindow::Unbounded,
        }
    }
}

/// Materialize the search source for a plan: a news-search URL over the
/// phrase (plus optional `when:` token), polled with the html-diff strategy.
pub fn build_search_source(plan: &SearchPlan) -> ScoutSource {
    let query = match plan.window.token() {
        Some(token) => format!("{} when:{token}", plan.phrase),
        None => plan.phrase.clone(),
    };

    let mut url = Url::parse(NEWS_SEARCH_BASE).expect("valid news search base URL");
    url.query_pairs_mut().append_pair("q", &query);

    ScoutSource {
        url: url.to_string(),
        label: plan.phrase.clone(),
        strategy: SourceStrategy::HtmlDiff,
    }
}

/// Plan used when query extraction fails: the raw query, truncated, with a
/// 7-day window.
pub fn fallback_plan(raw_query: &str) -> SearchPlan {
    SearchPlan {
        phrase: ai_client::truncate_to_char_boundary(raw_query.trim(), MAX_FALLBACK_PHRASE_BYTES)
            .to_string(),
        window: TimeWindow::SevenDays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_phrase_and_window() {
        let plan = SearchPlan {
            phrase: "nvidia gpu price drop".to_string(),
            window: TimeWindow::SevenDays,
        };
        let source = build_search_source(&plan);
        assert_eq!(
            source.url,
            "https://news.google.com/search?q=nvidia+gpu+price+drop+when%3A7d"
        );
        assert_eq!(source.label, "nvidia gpu price drop");
        assert_eq!(source.strategy, SourceStrategy::HtmlDiff);
    }

    #[test]
    fn unbounded_window_omits_when_token() {
        let plan = SearchPlan {
            phrase: "ferry schedule".to_string(),
            window: TimeWindow::Unbounded,
        };
        let source = build_search_source(&plan);
        assert!(!source.url.contains("when"));
    }

    #[test]
    fn fallback_truncates_and_uses_seven_days() {
        let long = "x".repeat(500);
        let plan = fallback_plan(&long);
        assert_eq!(plan.phrase.len(), 100);
        assert_eq!(plan.window, TimeWindow::SevenDays);
    }

    #[test]
    fn window_tokens_round_trip() {
        for (token, window) in [
            ("1d", TimeWindow::OneDay),
            ("7d", TimeWindow::SevenDays),
            ("30d", TimeWindow::ThirtyDays),
        ] {
            assert_eq!(TimeWindow::from_token(token), window);
            assert_eq!(window.token(), Some(token));
        }
        assert_eq!(TimeWindow::from_token("none"), TimeWindow::Unbounded);
        assert_eq!(TimeWindow::from_token("garbage"), TimeWindow::Unbounded);
    }
}
