use anyhow::Context;
use rand::Rng;
use std::time::Duration;

use crate::config::Settings;
use crate::fetch::{FetchError, FetchRequest, Page, PageFetcher};

/// Uniform random pause applied before polite requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn sample(&self) -> Duration {
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        if lo == hi {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    delay: Option<DelayRange>,
}

impl HttpFetcher {
    pub fn new(delay: Option<DelayRange>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build scraping http client")?;
        Ok(Self { http, delay })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(settings.http_delay)
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        if request.polite {
            if let Some(pause) = self.delay.map(|d| d.sample()) {
                tokio::time::sleep(pause).await;
            }
        }

        tracing::debug!(url = %request.url, profile = ?request.profile, "GET");
        let res = self
            .http
            .get(&request.url)
            .headers(request.profile.headers())
            .timeout(request.timeout)
            .send()
            .await?;

        let status = res.status().as_u16();
        let url = res.url().to_string();
        let body = res.text().await?;

        Ok(Page { url, status, body })
    }
}
