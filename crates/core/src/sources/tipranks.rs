use std::time::Duration;

use crate::domain::rating::{score_to_rating, DEFAULT_SCORE_TABLE, NOT_RATED, NOT_RATED_MARK, THREE_TIER};
use crate::domain::result::{build_success, Outcome, SourceKey, SourceReport, TipRanksResult};
use crate::domain::ticker::Ticker;
use crate::extract::{
    score_in_range, ticker_in_title, validate_page, Chain, PageContent, PatternProbe, SelectorProbe,
    Target,
};
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

const SCORE_SELECTORS: [&str; 7] = [
    r#"span[data-testid="smart-score-text"]"#,
    ".smart-score-text",
    r#"[class*="smart-score"]"#,
    r#"[class*="smartScore"]"#,
    r#"[data-testid*="score"]"#,
    ".score-text",
    r#"[class*="score-value"]"#,
];

const SCORE_PATTERNS: [&str; 3] = [r"Smart Score[:\s]*(\d+)", r"(\d+)/10", r"Score[:\s]*(\d+)"];

const RATING_SELECTORS: [&str; 5] = [
    r#"[data-testid*="rating"]"#,
    r#"[class*="rating"]"#,
    r#"[class*="sentiment"]"#,
    r#"[class*="recommendation"]"#,
    r#"[class*="consensus"]"#,
];

fn accept_three_tier(text: &str) -> Option<&'static str> {
    THREE_TIER.keyword_to_rating(text)
}

/// Smart Score (1..10) plus a three-tier rating.
pub struct TipRanks {
    score: Chain<String>,
    rating: Chain<&'static str>,
}

impl Default for TipRanks {
    fn default() -> Self {
        Self::new()
    }
}

impl TipRanks {
    pub fn new() -> Self {
        let mut score = Chain::new();
        for css in SCORE_SELECTORS {
            score = score.then(SelectorProbe::first(css), score_in_range);
        }
        for pattern in SCORE_PATTERNS {
            if let Some(probe) = PatternProbe::insensitive(pattern, Target::Text) {
                score = score.then(probe, score_in_range);
            }
        }

        let mut rating = Chain::new();
        for css in RATING_SELECTORS {
            rating = rating.then(SelectorProbe::all(css), accept_three_tier);
        }

        Self { score, rating }
    }
}

impl RatingSource for TipRanks {
    fn key(&self) -> SourceKey {
        SourceKey::TipRanks
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        vec![FetchRequest {
            url: format!("https://www.tipranks.com/stocks/{}", ticker.lower()),
            profile: HeaderProfile::Browser,
            timeout: Duration::from_secs(15),
            polite: true,
        }]
    }

    fn precheck(&self, ticker: &Ticker) -> Option<Failure> {
        ticker.is_foreign_or_otc().then_some(Failure::Skipped {
            status: "Foreign ticker",
            label: "Foreign/OTC",
        })
    }

    fn extract(&self, page: &Page, ticker: &Ticker) -> Result<SourceReport, Failure> {
        let content = PageContent::parse(&page.body);

        let check = validate_page(&content);
        let Some(title) = check.title else {
            return Err(Failure::PageInvalid { title_present: false });
        };
        if !check.valid {
            return Err(Failure::PageInvalid { title_present: true });
        }
        if !ticker_in_title(&title, ticker) {
            return Err(Failure::TickerMismatch);
        }

        let Some(score) = self.score.run(&content) else {
            if !title.contains(ticker.as_str()) {
                return Err(Failure::TickerMismatch);
            }
            return Ok(build_success(TipRanksResult {
                score: NOT_RATED_MARK.to_string(),
                rating: Some(NOT_RATED.to_string()),
                outcome: Outcome {
                    status: "Stock found but no Smart Score".to_string(),
                    success: true,
                },
            })
            .into());
        };

        let rating = self
            .rating
            .run(&content)
            .unwrap_or_else(|| score_to_rating(&score, &DEFAULT_SCORE_TABLE));

        Ok(build_success(TipRanksResult {
            score,
            rating: Some(rating.to_string()),
            ..Default::default()
        })
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(body: &str) -> Page {
        Page {
            url: "https://www.tipranks.com/stocks/aapl".into(),
            status: 200,
            body: body.into(),
        }
    }

    fn aapl() -> Ticker {
        Ticker::normalize("AAPL")
    }

    #[test]
    fn selector_score_with_explicit_rating() {
        let html = r#"<html><head><title>AAPL Stock Forecast</title></head><body>
            <span data-testid="smart-score-text">9</span>
            <div class="analyst-consensus">Moderate Buy</div></body></html>"#;
        let report = TipRanks::new().extract(&page(html), &aapl()).unwrap();
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"score": "9", "rating": "Outperform", "status": "Found", "success": true})
        );
    }

    #[test]
    fn text_pattern_skips_out_of_range_scores() {
        let html = r#"<html><head><title>AAPL</title></head><body>
            <p>Smart Score: 42</p><p>Rated 6/10 overall</p></body></html>"#;
        let report = TipRanks::new().extract(&page(html), &aapl()).unwrap();
        let SourceReport::TipRanks(r) = report else {
            panic!("wrong variant");
        };
        assert_eq!(r.score, "6");
        // No rating widget: derived from the score table.
        assert_eq!(r.rating.as_deref(), Some("Neutral"));
    }

    #[test]
    fn listed_without_score() {
        let html = r#"<html><head><title>AAPL Overview</title></head><body>nothing</body></html>"#;
        let report = TipRanks::new().extract(&page(html), &aapl()).unwrap();
        assert_eq!(report.primary(), "NR");
        assert_eq!(report.status(), "Stock found but no Smart Score");
        assert!(report.success());
    }

    #[test]
    fn title_checks() {
        let source = TipRanks::new();
        let untitled = source.extract(&page("<p>9/10</p>"), &aapl()).unwrap_err();
        assert_eq!(untitled.status(), "Invalid page");

        let error_page = source
            .extract(&page("<title>Page Not Found</title>"), &aapl())
            .unwrap_err();
        assert_eq!(error_page.status(), "Stock not found");

        let other = source
            .extract(&page("<title>MSFT Forecast</title><p>9/10</p>"), &aapl())
            .unwrap_err();
        assert_eq!(other, Failure::TickerMismatch);
    }

    #[test]
    fn foreign_tickers_are_skipped() {
        let failure = TipRanks::new().precheck(&Ticker::normalize("NSRGY")).unwrap();
        let report = failure.into_report(SourceKey::TipRanks);
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"score": "N/A", "rating": "Foreign/OTC", "status": "Foreign ticker", "success": false})
        );
        assert!(TipRanks::new().precheck(&aapl()).is_none());
    }
}
