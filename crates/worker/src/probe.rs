use anyhow::Context;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ratewatch_core::aggregate::Aggregator;
use ratewatch_core::domain::{SourceKey, SourceReport, Ticker};
use ratewatch_core::fetch::{FetchError, FetchRequest, Page, PageFetcher};
use ratewatch_core::sources::{run_source, source_for, RatingSource};

/// Passes requests through and remembers the last page that came back.
pub struct RecordingFetcher<F> {
    inner: F,
    last: Mutex<Option<Page>>,
}

impl<F: PageFetcher> RecordingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    pub fn last_page(&self) -> Option<Page> {
        self.last.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait::async_trait]
impl<F: PageFetcher> PageFetcher for RecordingFetcher<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        let page = self.inner.fetch(request).await?;
        if let Ok(mut last) = self.last.lock() {
            *last = Some(page.clone());
        }
        Ok(page)
    }
}

/// Runs a saved page through `source`'s extraction offline.
pub fn replay(source: &dyn RatingSource, ticker: &Ticker, body: String) -> SourceReport {
    let url = source
        .requests(ticker)
        .into_iter()
        .next()
        .map(|r| r.url)
        .unwrap_or_default();
    let page = Page {
        url,
        status: 200,
        body,
    };
    source
        .extract(&page, ticker)
        .unwrap_or_else(|failure| failure.into_report(source.key()))
}

pub fn replay_file(
    keys: &[SourceKey],
    ticker: &Ticker,
    html: &Path,
) -> anyhow::Result<BTreeMap<SourceKey, SourceReport>> {
    let body = std::fs::read_to_string(html).with_context(|| format!("read {}", html.display()))?;
    Ok(keys
        .iter()
        .map(|key| (*key, replay(source_for(*key).as_ref(), ticker, body.clone())))
        .collect())
}

/// Fetches one source live and stores the raw body it saw.
pub async fn fetch_and_save<F: PageFetcher>(
    fetcher: F,
    key: SourceKey,
    ticker: &Ticker,
    save: &Path,
) -> anyhow::Result<SourceReport> {
    let recorder = RecordingFetcher::new(fetcher);
    let source = source_for(key);
    let report = run_source(source.as_ref(), &recorder, ticker).await;

    match recorder.last_page() {
        Some(page) => {
            std::fs::write(save, &page.body)
                .with_context(|| format!("write {}", save.display()))?;
            tracing::info!(url = %page.url, http_status = page.status, path = %save.display(), "saved page");
        }
        None => tracing::warn!(source = %key, %ticker, "no page to save"),
    }
    Ok(report)
}

pub async fn live(
    aggregator: Arc<Aggregator>,
    key: Option<SourceKey>,
    ticker: &Ticker,
) -> anyhow::Result<serde_json::Value> {
    let value = match key {
        Some(key) => {
            let report = aggregator
                .collect_one(key, ticker)
                .await
                .with_context(|| format!("source {key} is not configured"))?;
            serde_json::to_value(report)?
        }
        None => serde_json::to_value(aggregator.collect(ticker).await)?,
    };
    Ok(value)
}
