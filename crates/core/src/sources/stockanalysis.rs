use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::time::Duration;

use crate::domain::rating::{FIVE_TIER_CONSENSUS, NOT_RATED};
use crate::domain::result::{build_success, Outcome, SourceKey, SourceReport, StockAnalysisResult};
use crate::domain::ticker::Ticker;
use crate::extract::{ticker_in_title, validate_page, PageContent};
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

fn insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("stockanalysis regex must compile")
}

// "26 analysts that cover Apple stock have a consensus rating of "Buy" and ..."
static CONSENSUS_SENTENCE: Lazy<Regex> = Lazy::new(|| {
    insensitive(
        r#"(\d+)\s*analysts?\s+(?:that\s+cover\s+)?(?:[^"]*?)consensus\s+(?:rating\s+)?of\s*["']?(strong\s+buy|buy|hold|sell|strong\s+sell|bullish|bearish)["']?"#,
    )
});

static CONSENSUS_ONLY: Lazy<Regex> = Lazy::new(|| {
    insensitive(r#"consensus\s+(?:rating\s+)?of\s*["']?(\w+(?:\s+\w+)?)["']?"#)
});

static PRICE_TARGET: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        insensitive(r"average\s+price\s+target\s+of\s*\$?([\d.]+)"),
        insensitive(r"price\s+target[:\s]*\$?([\d.]+)"),
        insensitive(r"target[:\s]*\$?([\d.]+)"),
    ]
});

static UPSIDE: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        insensitive(r"(\d+(?:\.\d+)?)\s*%\s*(?:upside|upside\s+potential)"),
        insensitive(r"(?:upside|upside\s+potential)[:\s]*(\d+(?:\.\d+)?)\s*%"),
        insensitive(r"(\d+(?:\.\d+)?)\s*%.*?upside"),
    ]
});

/// Python-style title casing: first letter of every word upper, the rest lower.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn normalize_consensus(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    FIVE_TIER_CONSENSUS
        .keyword_to_rating(&lower)
        .map(str::to_string)
        .unwrap_or_else(|| title_case(&lower))
}

#[derive(Debug, Default, PartialEq)]
struct Forecast {
    consensus: Option<String>,
    analyst_count: Option<u32>,
    price_target: Option<f64>,
    upside_downside: Option<String>,
}

fn read_forecast(text: &str) -> Forecast {
    let mut forecast = Forecast::default();

    if let Some(caps) = CONSENSUS_SENTENCE.captures(text) {
        forecast.analyst_count = caps.get(1).and_then(|m| m.as_str().parse().ok());
        forecast.consensus = caps.get(2).map(|m| normalize_consensus(m.as_str()));
    } else if let Some(caps) = CONSENSUS_ONLY.captures(text) {
        forecast.consensus = caps.get(1).map(|m| normalize_consensus(m.as_str()));
    }

    // A pattern whose capture does not parse falls through to the next one.
    forecast.price_target = PRICE_TARGET.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    });

    forecast.upside_downside = UPSIDE.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| format!("{}%", m.as_str()))
    });

    forecast
}

/// Analyst consensus, average price target and upside from the forecast page.
#[derive(Debug, Default)]
pub struct StockAnalysis;

impl StockAnalysis {
    pub fn new() -> Self {
        Self
    }
}

impl RatingSource for StockAnalysis {
    fn key(&self) -> SourceKey {
        SourceKey::StockAnalysis
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        vec![FetchRequest {
            url: format!("https://stockanalysis.com/stocks/{}/forecast/", ticker.lower()),
            profile: HeaderProfile::Browser,
            timeout: Duration::from_secs(15),
            polite: true,
        }]
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

        let forecast = read_forecast(&content.text);
        let record = StockAnalysisResult {
            consensus: String::new(),
            price_target: forecast.price_target,
            analyst_count: forecast.analyst_count,
            upside_downside: forecast.upside_downside,
            outcome: Outcome::default(),
        };

        if let Some(consensus) = forecast.consensus {
            return Ok(build_success(StockAnalysisResult { consensus, ..record }).into());
        }

        if !ticker_in_title(&title, ticker) {
            return Err(Failure::TickerMismatch);
        }

        Ok(build_success(StockAnalysisResult {
            consensus: NOT_RATED.to_string(),
            outcome: Outcome {
                status: "Stock found but not rated".to_string(),
                success: true,
            },
            ..record
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
            url: "https://stockanalysis.com/stocks/aapl/forecast/".into(),
            status: 200,
            body: body.into(),
        }
    }

    #[test]
    fn reads_consensus_sentence() {
        let html = r#"<html><head><title>Apple (AAPL) Stock Forecast</title></head><body>
            <p>According to 26 analysts that cover Apple stock have a consensus rating of "Buy"
            and an average price target of $275.87, which forecasts a 12.5% upside in the next year.</p>
            </body></html>"#;
        let report = StockAnalysis::new()
            .extract(&page(html), &Ticker::normalize("AAPL"))
            .unwrap();
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({
                "consensus": "Buy",
                "price_target": 275.87,
                "analyst_count": 26,
                "upside_downside": "12.5%",
                "status": "Found",
                "success": true
            })
        );
    }

    #[test]
    fn short_consensus_phrase_falls_back() {
        let forecast = read_forecast("The consensus of Outperform Rated stands");
        assert_eq!(forecast.consensus.as_deref(), Some("Outperform Rated"));
        assert_eq!(forecast.analyst_count, None);

        let bullish = read_forecast(r#"consensus rating of "bullish""#);
        assert_eq!(bullish.consensus.as_deref(), Some("Buy"));
    }

    #[test]
    fn unrated_listing() {
        let html = r#"<html><head><title>AAPL Forecast</title></head><body>No analysts yet</body></html>"#;
        let report = StockAnalysis::new()
            .extract(&page(html), &Ticker::normalize("AAPL"))
            .unwrap();
        assert_eq!(report.primary(), "Not Rated");
        assert!(report.success());
    }

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("outperform rated"), "Outperform Rated");
        assert_eq!(title_case("MODERATE-buy"), "Moderate-Buy");
    }
}
