use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // AI provider
    pub anthropic_api_key: String,

    // Outbound email (SMTP relay)
    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub notify_from: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Per-scout state stores live under this directory
    pub data_dir: std::path::PathBuf,

    pub engine: EngineSettings,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            smtp_host: required_env("SMTP_HOST"),
            smtp_user: required_env("SMTP_USER"),
            smtp_pass: required_env("SMTP_PASS"),
            notify_from: env::var("NOTIFY_EMAIL_FROM")
                .unwrap_or_else(|_| "scout@terascout.dev".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            data_dir: std::path::PathBuf::from(
                env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            engine: EngineSettings::from_env(),
        }
    }

    /// Log the presence of each sensitive env var without leaking values.
    pub fn log_redacted(&self) {
        let vars = [
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("SMTP_HOST", &self.smtp_host),
            ("SMTP_USER", &self.smtp_user),
            ("SMTP_PASS", &self.smtp_pass),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

/// Engine tuning. Compile-time defaults, overridable from the environment
/// once at startup. One instance is shared by every scout engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Gate on notification dispatch.
    pub max_emails_per_scout_per_day: u32,
    /// Default `expires_at` offset from creation.
    pub default_lifetime_hours: i64,
    /// Cap on a user-supplied `expires_at`.
    pub max_lifetime_hours: i64,
    /// Durable sleep between cycles.
    pub poll_interval: Duration,
    /// Hard upper bound on cycles per engine instance.
    pub max_cycles: u32,
    /// Truncation applied on snapshot writes.
    pub max_snapshot_text_length: usize,
    /// Truncation applied to analyzer inputs.
    pub max_ai_text_length: usize,
    /// Recent-event window for semantic dedup.
    pub dedupe_lookback: usize,
    /// Linear delay between fetch retries.
    pub fetch_retry_delay: Duration,
    /// Base of the exponential delay between email retries.
    pub email_retry_base: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_emails_per_scout_per_day: 10,
            default_lifetime_hours: 72,
            max_lifetime_hours: 168,
            poll_interval: Duration::from_secs(600),
            max_cycles: 200,
            max_snapshot_text_length: 5_000,
            max_ai_text_length: 2_500,
            dedupe_lookback: 5,
            fetch_retry_delay: Duration::from_secs(5),
            email_retry_base: Duration::from_secs(10),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_emails_per_scout_per_day: env_or("MAX_EMAILS_PER_SCOUT_PER_DAY", defaults.max_emails_per_scout_per_day),
            default_lifetime_hours: env_or("DEFAULT_LIFETIME_HOURS", defaults.default_lifetime_hours),
            max_lifetime_hours: env_or("MAX_LIFETIME_HOURS", defaults.max_lifetime_hours),
            poll_interval: Duration::from_secs(env_or(
                "POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            max_cycles: env_or("MAX_CYCLES", defaults.max_cycles),
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = EngineSettings::default();
        assert_eq!(s.max_emails_per_scout_per_day, 10);
        assert_eq!(s.default_lifetime_hours, 72);
        assert_eq!(s.max_lifetime_hours, 168);
        assert_eq!(s.poll_interval, Duration::from_secs(600));
        assert_eq!(s.max_cycles, 200);
        assert_eq!(s.max_snapshot_text_length, 5_000);
        assert_eq!(s.max_ai_text_length, 2_500);
        assert_eq!(s.dedupe_lookback, 5);
    }
}
