pub mod aggregate;
pub mod domain;
pub mod extract;
pub mod fetch;
pub mod sources;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    use crate::domain::result::SourceKey;
    use crate::fetch::DelayRange;

    pub const DEFAULT_PORT: u16 = 5001;
    pub const DEFAULT_AGGREGATE_TIMEOUT_SECS: u64 = 45;
    pub const DEFAULT_HTTP_DELAY_MIN_MS: u64 = 500;
    pub const DEFAULT_HTTP_DELAY_MAX_MS: u64 = 1500;
    pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 10;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub port: u16,
        pub aggregate_timeout: Duration,
        /// `None` when polite delays are disabled.
        pub http_delay: Option<DelayRange>,
        pub sources: Vec<SourceKey>,
        /// Requests per minute on the ratings routes; `None` leaves them unlimited.
        pub rate_limit_per_minute: Option<u32>,
        pub secure_headers: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                sentry_dsn: None,
                port: DEFAULT_PORT,
                aggregate_timeout: Duration::from_secs(DEFAULT_AGGREGATE_TIMEOUT_SECS),
                http_delay: Some(DelayRange::new(
                    Duration::from_millis(DEFAULT_HTTP_DELAY_MIN_MS),
                    Duration::from_millis(DEFAULT_HTTP_DELAY_MAX_MS),
                )),
                sources: SourceKey::ALL.to_vec(),
                rate_limit_per_minute: None,
                secure_headers: false,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let port = env_parse("PORT").unwrap_or(DEFAULT_PORT);
            let aggregate_timeout = env_parse("AGGREGATE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.aggregate_timeout);

            let http_delay = if std::env::var("HTTP_DELAY_DISABLED").is_ok() {
                None
            } else {
                let min = env_parse("HTTP_DELAY_MIN_MS").unwrap_or(DEFAULT_HTTP_DELAY_MIN_MS);
                let max = env_parse("HTTP_DELAY_MAX_MS").unwrap_or(DEFAULT_HTTP_DELAY_MAX_MS);
                Some(DelayRange::new(
                    Duration::from_millis(min),
                    Duration::from_millis(max),
                ))
            };

            let sources = match std::env::var("RATING_SOURCES") {
                Ok(list) if !list.trim().is_empty() => {
                    parse_sources(&list).context("RATING_SOURCES is invalid")?
                }
                _ => defaults.sources,
            };

            let rate_limit_per_minute = env_flag("RATE_LIMIT_ENABLED").then(|| {
                env_parse("RATE_LIMIT_PER_MINUTE")
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE)
            });

            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port,
                aggregate_timeout,
                http_delay,
                sources,
                rate_limit_per_minute,
                secure_headers: env_flag("SECURE_HEADERS"),
            })
        }

        pub fn without_delay(mut self) -> Self {
            self.http_delay = None;
            self
        }
    }

    fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
    }

    fn env_flag(name: &str) -> bool {
        std::env::var(name).is_ok_and(|v| is_truthy(&v))
    }

    fn is_truthy(value: &str) -> bool {
        matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
    }

    /// Comma separated source keys, duplicates dropped, order kept.
    pub fn parse_sources(list: &str) -> anyhow::Result<Vec<SourceKey>> {
        let mut keys = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let key: SourceKey = part.parse()?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        anyhow::ensure!(!keys.is_empty(), "no rating sources configured");
        Ok(keys)
    }

}
