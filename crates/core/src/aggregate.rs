use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::domain::result::{SourceKey, SourceReport};
use crate::domain::ticker::Ticker;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::sources::{self, run_source, Failure, RatingSource};

/// One ticker's ratings across every configured source.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResponse {
    pub ticker: Ticker,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub results: BTreeMap<SourceKey, SourceReport>,
}

impl AggregatedResponse {
    pub fn get(&self, key: SourceKey) -> Option<&SourceReport> {
        self.results.get(&key)
    }
}

/// Fans one ticker out to every source concurrently and waits up to a shared deadline.
#[derive(Clone)]
pub struct Aggregator {
    sources: Vec<Arc<dyn RatingSource>>,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn RatingSource>>,
        fetcher: Arc<dyn PageFetcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            sources,
            fetcher,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::from_settings(settings)?;
        Ok(Self::new(
            sources::build(&settings.sources),
            Arc::new(fetcher),
            settings.aggregate_timeout,
        ))
    }

    pub fn keys(&self) -> Vec<SourceKey> {
        self.sources.iter().map(|s| s.key()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn collect(&self, ticker: &Ticker) -> AggregatedResponse {
        let timestamp = Utc::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = Arc::clone(source);
            let fetcher = Arc::clone(&self.fetcher);
            let t = ticker.clone();
            let key = source.key();
            let handle =
                tokio::spawn(async move { run_source(source.as_ref(), fetcher.as_ref(), &t).await });
            handles.push((key, handle));
        }

        // One slot per source, each written exactly once.
        let mut results = BTreeMap::new();
        for (key, mut handle) in handles {
            let report = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(report)) => report,
                Ok(Err(join_err)) => {
                    tracing::error!(source = %key, %ticker, error = %join_err, "source task failed");
                    Failure::Aborted(join_err.to_string()).into_report(key)
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(source = %key, %ticker, timeout = ?self.timeout, "source timed out");
                    Failure::TimedOut.into_report(key)
                }
            };
            results.insert(key, report);
        }

        let succeeded = results.values().filter(|r| r.success()).count();
        tracing::info!(%ticker, succeeded, total = results.len(), "ratings collected");

        AggregatedResponse {
            ticker: ticker.clone(),
            timestamp,
            results,
        }
    }

    /// Runs a single configured source under the same timeout. `None` if `key` is not configured.
    pub async fn collect_one(&self, key: SourceKey, ticker: &Ticker) -> Option<SourceReport> {
        let source = self.sources.iter().find(|s| s.key() == key)?.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let t = ticker.clone();
        let mut handle =
            tokio::spawn(async move { run_source(source.as_ref(), fetcher.as_ref(), &t).await });

        let report = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(report)) => report,
            Ok(Err(join_err)) => Failure::Aborted(join_err.to_string()).into_report(key),
            Err(_) => {
                handle.abort();
                Failure::TimedOut.into_report(key)
            }
        };
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{CannedFetcher, FetchRequest, Page};
    use crate::sources::source_for;

    fn all_sources() -> Vec<Arc<dyn RatingSource>> {
        SourceKey::ALL.into_iter().map(source_for).collect()
    }

    #[tokio::test]
    async fn unknown_ticker_fills_every_slot_with_a_failure() {
        let aggregator = Aggregator::new(
            all_sources(),
            Arc::new(CannedFetcher::new()),
            Duration::from_secs(5),
        );

        let response = aggregator.collect(&Ticker::normalize("zzzz")).await;
        assert_eq!(response.results.len(), SourceKey::ALL.len());
        for (key, report) in &response.results {
            assert!(!report.success(), "{key} should fail");
            assert!(!report.status().is_empty(), "{key} needs a status");
        }

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["ticker"], "ZZZZ");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["zacks"]["rank"], "N/A");
        assert_eq!(json["stockanalysis"]["consensus"], "N/A");
    }

    #[tokio::test]
    async fn hanging_source_times_out_alone() {
        let fetcher = CannedFetcher::new()
            .hang("barchart.com")
            .page(
                "zacks.com",
                200,
                r#"<h1>AAPL</h1><p class="rank_view"><span class="rank_chip">1</span></p>"#,
            )
            .page(
                "stockopedia.com",
                200,
                r#"{"stockRank":72,"style":"Super Stock"}"#,
            );
        let aggregator = Aggregator::new(
            all_sources(),
            Arc::new(fetcher),
            Duration::from_millis(200),
        );

        let response = aggregator.collect(&Ticker::normalize("AAPL")).await;

        let barchart = response.get(SourceKey::Barchart).unwrap();
        assert!(!barchart.success());
        assert_eq!(barchart.status(), "Request timeout");

        let zacks = response.get(SourceKey::Zacks).unwrap();
        assert!(zacks.success());
        assert_eq!(zacks.primary(), "1");

        let stockopedia = response.get(SourceKey::Stockopedia).unwrap();
        assert!(stockopedia.success());
        assert_eq!(stockopedia.primary(), "72");

        // The rest answered 404 on their own, well before the deadline.
        let tipranks = response.get(SourceKey::TipRanks).unwrap();
        assert_eq!(tipranks.status(), "Stock not found");
    }

    struct Exploding;

    impl RatingSource for Exploding {
        fn key(&self) -> SourceKey {
            SourceKey::Zacks
        }

        fn requests(&self, _ticker: &Ticker) -> Vec<FetchRequest> {
            source_for(SourceKey::Zacks).requests(&Ticker::normalize("AAPL"))
        }

        fn extract(&self, _page: &Page, _ticker: &Ticker) -> Result<SourceReport, Failure> {
            panic!("parser bug");
        }
    }

    #[tokio::test]
    async fn panicking_source_becomes_an_error_slot() {
        let fetcher = CannedFetcher::new().page("zacks.com", 200, "<h1>AAPL</h1>");
        let aggregator = Aggregator::new(
            vec![Arc::new(Exploding)],
            Arc::new(fetcher),
            Duration::from_secs(5),
        );

        let response = aggregator.collect(&Ticker::normalize("AAPL")).await;
        let zacks = response.get(SourceKey::Zacks).unwrap();
        assert!(!zacks.success());
        assert!(zacks.status().starts_with("Task failed"));
    }

    #[tokio::test]
    async fn collect_one_ignores_unconfigured_sources() {
        let aggregator = Aggregator::new(
            vec![source_for(SourceKey::Stockopedia)],
            Arc::new(CannedFetcher::new()),
            Duration::from_secs(5),
        );
        let ticker = Ticker::normalize("AAPL");
        assert!(aggregator.collect_one(SourceKey::Zacks, &ticker).await.is_none());
        let report = aggregator
            .collect_one(SourceKey::Stockopedia, &ticker)
            .await
            .unwrap();
        assert_eq!(report.status(), "Stock not found");
        assert_eq!(aggregator.keys(), vec![SourceKey::Stockopedia]);
    }
}
