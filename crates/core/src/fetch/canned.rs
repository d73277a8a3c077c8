//! In-memory [`PageFetcher`] used by tests and by the worker's offline replay.

use std::sync::Mutex;

use crate::fetch::{FetchError, FetchRequest, Page, PageFetcher};

#[derive(Debug, Clone)]
pub enum CannedResponse {
    Page { status: u16, body: String },
    Fail(FetchError),
    /// Never completes.
    Hang,
}

/// Routes are matched by substring against the request URL, in insertion order.
#[derive(Debug)]
pub struct CannedFetcher {
    routes: Vec<(String, CannedResponse)>,
    otherwise: CannedResponse,
    calls: Mutex<Vec<String>>,
}

impl Default for CannedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedFetcher {
    /// Unrouted URLs answer with an empty 404.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            otherwise: CannedResponse::Page {
                status: 404,
                body: String::new(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn page(mut self, url_part: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.push((
            url_part.to_string(),
            CannedResponse::Page {
                status,
                body: body.into(),
            },
        ));
        self
    }

    pub fn fail(mut self, url_part: &str, err: FetchError) -> Self {
        self.routes
            .push((url_part.to_string(), CannedResponse::Fail(err)));
        self
    }

    pub fn hang(mut self, url_part: &str) -> Self {
        self.routes.push((url_part.to_string(), CannedResponse::Hang));
        self
    }

    pub fn otherwise(mut self, response: CannedResponse) -> Self {
        self.otherwise = response;
        self
    }

    /// URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn route(&self, url: &str) -> CannedResponse {
        self.routes
            .iter()
            .find(|(part, _)| url.contains(part.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.otherwise.clone())
    }
}

#[async_trait::async_trait]
impl PageFetcher for CannedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.url.clone());
        }

        match self.route(&request.url) {
            CannedResponse::Page { status, body } => Ok(Page {
                url: request.url.clone(),
                status,
                body,
            }),
            CannedResponse::Fail(err) => Err(err),
            CannedResponse::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HeaderProfile;
    use std::time::Duration;

    fn request(url: &str) -> FetchRequest {
        FetchRequest {
            url: url.to_string(),
            profile: HeaderProfile::Standard,
            timeout: Duration::from_secs(1),
            polite: false,
        }
    }

    #[tokio::test]
    async fn routes_by_substring_and_records_calls() {
        let fetcher = CannedFetcher::new()
            .page("zacks.com", 200, "<title>AAPL</title>")
            .fail("tipranks.com", FetchError::Timeout);

        let page = fetcher
            .fetch(&request("https://www.zacks.com/stock/quote/AAPL"))
            .await
            .unwrap();
        assert_eq!(page.status, 200);

        let err = fetcher
            .fetch(&request("https://www.tipranks.com/stocks/aapl"))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);

        let missing = fetcher
            .fetch(&request("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);

        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn hang_never_resolves() {
        let fetcher = CannedFetcher::new().hang("slow");
        let res = tokio::time::timeout(
            Duration::from_millis(50),
            fetcher.fetch(&request("https://slow.example/")),
        )
        .await;
        assert!(res.is_err());
    }
}
