//! Per-site rating sources and the fetch -> extract pipeline they share.

pub mod barchart;
pub mod stockanalysis;
pub mod stockopedia;
pub mod stockstory;
pub mod tipranks;
pub mod zacks;

use std::sync::Arc;

use crate::domain::result::{SourceKey, SourceReport};
use crate::domain::ticker::Ticker;
use crate::fetch::{truncate_chars, FetchError, FetchRequest, Page, PageFetcher, MAX_ERROR_CHARS};

pub use barchart::Barchart;
pub use stockanalysis::StockAnalysis;
pub use stockopedia::Stockopedia;
pub use stockstory::StockStory;
pub use tipranks::TipRanks;
pub use zacks::Zacks;

/// Every way a source can fail to produce a value. Each renders to a user-facing status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Transport(FetchError),
    HttpStatus(u16),
    /// No title (`title_present = false`) or an error-page title.
    PageInvalid { title_present: bool },
    TickerMismatch,
    /// The aggregator stopped waiting.
    TimedOut,
    /// The task died before reporting.
    Aborted(String),
    /// Short-circuited before any network call.
    Skipped {
        status: &'static str,
        label: &'static str,
    },
}

impl Failure {
    pub fn status(&self) -> String {
        match self {
            Failure::Transport(err) => err.to_string(),
            Failure::HttpStatus(404) => "Stock not found".to_string(),
            Failure::HttpStatus(403) => "Access forbidden".to_string(),
            Failure::HttpStatus(429) => "Too many requests".to_string(),
            Failure::HttpStatus(471) => "Site blocking requests".to_string(),
            Failure::HttpStatus(code) => format!("HTTP {code}"),
            Failure::PageInvalid {
                title_present: false,
            } => "Invalid page".to_string(),
            Failure::PageInvalid {
                title_present: true,
            }
            | Failure::TickerMismatch => "Stock not found".to_string(),
            Failure::TimedOut => "Request timeout".to_string(),
            Failure::Aborted(msg) => truncate_chars(&format!("Task failed: {msg}"), MAX_ERROR_CHARS),
            Failure::Skipped { status, .. } => status.to_string(),
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Failure::Transport(err) => Some(err.label()),
            Failure::HttpStatus(403) => Some("Forbidden"),
            Failure::HttpStatus(429) => Some("Rate Limited"),
            Failure::HttpStatus(471) => Some("Access Blocked"),
            Failure::HttpStatus(_) | Failure::PageInvalid { .. } | Failure::TickerMismatch => None,
            Failure::Aborted(_) => Some("Error"),
            Failure::TimedOut => Some("Timeout"),
            Failure::Skipped { label, .. } => Some(*label),
        }
    }

    pub fn into_report(self, key: SourceKey) -> SourceReport {
        SourceReport::error(key, &self.status(), self.label())
    }
}

/// One site's URL templates, request policy and extraction chain.
pub trait RatingSource: Send + Sync {
    fn key(&self) -> SourceKey;

    /// Candidate pages, tried in order until one answers 200.
    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest>;

    /// Rejects tickers the site is known not to carry, without touching the network.
    fn precheck(&self, _ticker: &Ticker) -> Option<Failure> {
        None
    }

    /// Pure extraction from a 200 page.
    fn extract(&self, page: &Page, ticker: &Ticker) -> Result<SourceReport, Failure>;
}

/// Runs one source end to end. Every path yields exactly one report.
pub async fn run_source(
    source: &dyn RatingSource,
    fetcher: &dyn PageFetcher,
    ticker: &Ticker,
) -> SourceReport {
    let key = source.key();
    if let Some(failure) = source.precheck(ticker) {
        tracing::debug!(source = %key, %ticker, status = %failure.status(), "skipped");
        return failure.into_report(key);
    }

    let mut last = Failure::HttpStatus(404);
    for request in source.requests(ticker) {
        match fetcher.fetch(&request).await {
            Ok(page) if page.status == 200 => {
                return match source.extract(&page, ticker) {
                    Ok(report) => {
                        tracing::info!(
                            source = %key,
                            %ticker,
                            value = report.primary(),
                            status = report.status(),
                            "source reported"
                        );
                        report
                    }
                    Err(failure) => {
                        tracing::info!(source = %key, %ticker, status = %failure.status(), "no rating");
                        failure.into_report(key)
                    }
                };
            }
            Ok(page) => {
                tracing::warn!(source = %key, %ticker, url = %request.url, http_status = page.status, "non-200 response");
                last = Failure::HttpStatus(page.status);
            }
            Err(err) => {
                tracing::warn!(source = %key, %ticker, url = %request.url, error = %err, "fetch failed");
                last = Failure::Transport(err);
            }
        }
    }
    last.into_report(key)
}

pub fn source_for(key: SourceKey) -> Arc<dyn RatingSource> {
    match key {
        SourceKey::Zacks => Arc::new(Zacks),
        SourceKey::TipRanks => Arc::new(TipRanks::new()),
        SourceKey::Barchart => Arc::new(Barchart::new()),
        SourceKey::Stockopedia => Arc::new(Stockopedia::new()),
        SourceKey::StockAnalysis => Arc::new(StockAnalysis::new()),
        SourceKey::StockStory => Arc::new(StockStory::new()),
    }
}

pub fn build(keys: &[SourceKey]) -> Vec<Arc<dyn RatingSource>> {
    keys.iter().copied().map(source_for).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::CannedFetcher;

    #[test]
    fn http_status_table() {
        assert_eq!(Failure::HttpStatus(404).status(), "Stock not found");
        assert_eq!(Failure::HttpStatus(403).status(), "Access forbidden");
        assert_eq!(Failure::HttpStatus(429).status(), "Too many requests");
        assert_eq!(Failure::HttpStatus(471).status(), "Site blocking requests");
        assert_eq!(Failure::HttpStatus(503).status(), "HTTP 503");
        assert_eq!(Failure::HttpStatus(471).label(), Some("Access Blocked"));
        assert_eq!(Failure::HttpStatus(503).label(), None);
    }

    #[test]
    fn free_text_statuses_are_bounded() {
        let failure = Failure::Aborted("e".repeat(200));
        assert_eq!(failure.status().chars().count(), MAX_ERROR_CHARS);
        assert!(failure.status().starts_with("Task failed"));
        assert_eq!(failure.label(), Some("Error"));
    }

    #[tokio::test]
    async fn not_found_skips_extraction() {
        let fetcher = CannedFetcher::new();
        for key in SourceKey::ALL {
            let source = source_for(key);
            let report = run_source(source.as_ref(), &fetcher, &Ticker::normalize("ZZZZ")).await;
            assert!(!report.success(), "{key}");
            assert!(report.status().to_lowercase().contains("not found"), "{key}");
            assert_eq!(report.primary(), "N/A");
        }
    }

    #[tokio::test]
    async fn empty_page_goes_through_validation() {
        let fetcher = CannedFetcher::new()
            .page("zacks.com", 200, "")
            .page("tipranks.com", 200, "  ");
        let ticker = Ticker::normalize("AAPL");

        let zacks = run_source(&Zacks, &fetcher, &ticker).await;
        assert_eq!(
            serde_json::to_value(&zacks).unwrap(),
            serde_json::json!({"rank": "N/A", "status": "Stock not found", "success": false})
        );

        let tipranks = run_source(&TipRanks::new(), &fetcher, &ticker).await;
        assert!(!tipranks.success());
        assert_eq!(tipranks.primary(), "N/A");
    }

    #[tokio::test]
    async fn transport_failure_keeps_label() {
        let fetcher = CannedFetcher::new().fail("tipranks.com", FetchError::ConnectionFailed);
        let report = run_source(&TipRanks::new(), &fetcher, &Ticker::normalize("AAPL")).await;
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "score": "N/A",
                "rating": "Connection Error",
                "status": "Connection failed",
                "success": false
            })
        );
    }
}
