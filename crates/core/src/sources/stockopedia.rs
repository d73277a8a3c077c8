use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::domain::rating::{score_to_category, NOT_RATED, NOT_RATED_MARK, RANK_BANDS};
use crate::domain::result::{build_success, Outcome, SourceKey, SourceReport, StockopediaResult};
use crate::domain::ticker::Ticker;
use crate::extract::{Chain, PageContent, PatternProbe, Target};
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

static STOCK_RANK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""stockRank":(\d+)"#).expect("stockRank regex must compile"));
static STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""style":"([^"]+)""#).expect("style regex must compile"));

fn accept_rank(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

fn accept_style(raw: &str) -> Option<String> {
    Some(raw.to_string())
}

/// StockRank (0..100) read from the JSON state embedded in the share-price page.
pub struct Stockopedia {
    rank: Chain<i64>,
    style: Chain<String>,
}

impl Default for Stockopedia {
    fn default() -> Self {
        Self::new()
    }
}

impl Stockopedia {
    pub fn new() -> Self {
        Self {
            rank: Chain::new().then(PatternProbe::new(STOCK_RANK.clone(), Target::Raw), accept_rank),
            style: Chain::new().then(PatternProbe::new(STYLE.clone(), Target::Raw), accept_style),
        }
    }
}

impl RatingSource for Stockopedia {
    fn key(&self) -> SourceKey {
        SourceKey::Stockopedia
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        vec![FetchRequest {
            url: format!(
                "https://www.stockopedia.com/share-prices/{}-NSQ:{}/",
                ticker.lower(),
                ticker
            ),
            profile: HeaderProfile::Standard,
            timeout: Duration::from_secs(10),
            polite: true,
        }]
    }

    fn extract(&self, page: &Page, ticker: &Ticker) -> Result<SourceReport, Failure> {
        let content = PageContent::parse(&page.body);

        if let Some(rank) = self.rank.run(&content) {
            return Ok(build_success(StockopediaResult {
                stockrank: rank.to_string(),
                category: Some(score_to_category(rank, &RANK_BANDS).to_string()),
                style: Some(
                    self.style
                        .run(&content)
                        .unwrap_or_else(|| "Unknown".to_string()),
                ),
                ..Default::default()
            })
            .into());
        }

        if !page.body.contains(ticker.as_str()) {
            return Err(Failure::TickerMismatch);
        }

        Ok(build_success(StockopediaResult {
            stockrank: NOT_RATED_MARK.to_string(),
            style: Some(NOT_RATED.to_string()),
            outcome: Outcome {
                status: "Stock found but not rated".to_string(),
                success: true,
            },
            ..Default::default()
        })
        .into())
    }
}
