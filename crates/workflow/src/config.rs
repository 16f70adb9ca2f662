use std::str::FromStr;
use std::time::Duration;

/// Workflow configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// REST base URL of the analysis backend.
    pub api_url: String,
    /// WebSocket base URL of the analysis backend.
    pub ws_url: String,
    /// Demo mode treats the user as authorized without a session.
    pub demo_mode: bool,
    /// Pause between entering topic generation and requesting topics.
    pub topic_settle_delay: Duration,
    pub narrative_poll_interval: Duration,
    pub narrative_max_attempts: u32,
    /// Job-status polling is the fallback when the event feed is unavailable.
    pub job_poll_interval: Duration,
    pub job_max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001".to_string(),
            ws_url: "ws://localhost:3001".to_string(),
            demo_mode: false,
            topic_settle_delay: Duration::from_millis(100),
            narrative_poll_interval: Duration::from_secs(1),
            narrative_max_attempts: 120,
            job_poll_interval: Duration::from_secs(2),
            job_max_attempts: 150,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                 |
    /// |-----------------------------------|-------------------------|
    /// | `POSTWISE_API_URL`                | `http://localhost:3001` |
    /// | `POSTWISE_WS_URL`                 | `ws://localhost:3001`   |
    /// | `POSTWISE_DEMO_MODE`              | `false`                 |
    /// | `POSTWISE_TOPIC_DELAY_MS`         | `100`                   |
    /// | `POSTWISE_NARRATIVE_POLL_MS`      | `1000`                  |
    /// | `POSTWISE_NARRATIVE_MAX_ATTEMPTS` | `120`                   |
    /// | `POSTWISE_JOB_POLL_MS`            | `2000`                  |
    /// | `POSTWISE_JOB_MAX_ATTEMPTS`       | `150`                   |
    /// | `POSTWISE_REQUEST_TIMEOUT_SECS`   | `30`                    |
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            api_url: lookup("POSTWISE_API_URL").unwrap_or(defaults.api_url),
            ws_url: lookup("POSTWISE_WS_URL").unwrap_or(defaults.ws_url),
            demo_mode: parse_or(&lookup, "POSTWISE_DEMO_MODE", defaults.demo_mode),
            topic_settle_delay: Duration::from_millis(parse_or(
                &lookup,
                "POSTWISE_TOPIC_DELAY_MS",
                100,
            )),
            narrative_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "POSTWISE_NARRATIVE_POLL_MS",
                1000,
            )),
            narrative_max_attempts: parse_or(
                &lookup,
                "POSTWISE_NARRATIVE_MAX_ATTEMPTS",
                defaults.narrative_max_attempts,
            ),
            job_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "POSTWISE_JOB_POLL_MS",
                2000,
            )),
            job_max_attempts: parse_or(&lookup, "POSTWISE_JOB_MAX_ATTEMPTS", defaults.job_max_attempts),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "POSTWISE_REQUEST_TIMEOUT_SECS",
                30,
            )),
        }
    }

    pub fn with_demo_mode(mut self, demo_mode: bool) -> Self {
        self.demo_mode = demo_mode;
        self
    }

    pub fn with_topic_settle_delay(mut self, delay: Duration) -> Self {
        self.topic_settle_delay = delay;
        self
    }

    pub fn with_narrative_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.narrative_poll_interval = interval;
        self.narrative_max_attempts = max_attempts;
        self
    }

    pub fn with_job_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.job_poll_interval = interval;
        self.job_max_attempts = max_attempts;
        self
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
                default
            }
        },
    }
}
