use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::domain::rating::NOT_AVAILABLE;
use crate::domain::result::{build_success, Outcome, SourceKey, SourceReport, StockStoryResult};
use crate::domain::ticker::Ticker;
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

const EXCHANGES: [&str; 2] = ["nasdaq", "nyse"];
const POSITIVE_TAGS: [&str; 4] = ["High Quality", "Timely Buy", "Good Value", "Strong Growth"];
const UNKNOWN: &str = "Unknown";

static COMPANY_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"aria-label="Company tag: ([^"]+)""#).expect("company tag regex must compile")
});
static COMPANY_RATING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"aria-label="Company rating: ([^"]+)""#).expect("company rating regex must compile")
});
static JSON_LD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<script type="application/ld\+json">(.*?)</script>"#)
        .expect("json-ld regex must compile")
});

/// Capture group 1 of every match, de-duplicated in first-seen order.
fn unique_captures(re: &Regex, body: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for caps in re.captures_iter(body) {
        if let Some(m) = caps.get(1) {
            if !seen.iter().any(|s| s == m.as_str()) {
                seen.push(m.as_str().to_string());
            }
        }
    }
    seen
}

fn rating_sentiment(rating: &str) -> &'static str {
    match rating {
        "Underperform" | "Avoid" => "Negative",
        "Outperform" => "Positive",
        "Speculative" => "Risky",
        _ => "Neutral",
    }
}

/// Verdict from company rating badges, falling back to company tags.
fn from_badges(ratings: &[String], tags: &[String]) -> Option<(String, &'static str)> {
    if let Some(primary) = ratings.first() {
        let mut sentiment = rating_sentiment(primary);
        let mut text = primary.clone();
        if matches!(sentiment, "Neutral" | "Positive") {
            let positive: Vec<&str> = tags
                .iter()
                .map(String::as_str)
                .filter(|t| POSITIVE_TAGS.contains(t))
                .collect();
            if !positive.is_empty() {
                text = format!("{primary} + {}", positive.join(", "));
                sentiment = "Positive";
            }
        }
        return Some((text, sentiment));
    }

    if tags.is_empty() {
        return None;
    }
    let has = |tag: &str| tags.iter().any(|t| t == tag);
    let verdict = if has("High Quality") && has("Timely Buy") {
        ("High Quality & Timely Buy".to_string(), "Very Positive")
    } else if let Some(tag) = POSITIVE_TAGS.iter().find(|&&t| has(t)) {
        (tag.to_string(), "Positive")
    } else {
        (
            tags.iter().take(2).cloned().collect::<Vec<_>>().join(", "),
            "Neutral",
        )
    };
    Some(verdict)
}

/// Verdict from the editorial phrasing in JSON-LD descriptions.
fn from_description(body: &str) -> Option<(String, &'static str)> {
    JSON_LD.captures_iter(body).find_map(|caps| {
        let value: serde_json::Value = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
        let desc = value.get("description")?.as_str()?;
        let verdict = if desc.contains("We like") {
            ("Like", "Positive")
        } else if desc.contains("We love") {
            ("Love", "Very Positive")
        } else if desc.contains("not sold") {
            ("Not Sold", "Negative")
        } else if desc.to_lowercase().contains("outstanding") {
            ("Outstanding", "Positive")
        } else {
            return None;
        };
        Some((verdict.0.to_string(), verdict.1))
    })
}

/// Exchange segment of a `.../stocks/{exchange}/{ticker}` URL.
fn exchange_of(url: &str) -> String {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    segments.next();
    segments
        .next()
        .map(str::to_uppercase)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Editorial rating and sentiment, looked up on NASDAQ first and then NYSE.
#[derive(Debug, Default)]
pub struct StockStory;

impl StockStory {
    pub fn new() -> Self {
        Self
    }
}

impl RatingSource for StockStory {
    fn key(&self) -> SourceKey {
        SourceKey::StockStory
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        EXCHANGES
            .iter()
            .map(|exchange| FetchRequest {
                url: format!("https://stockstory.org/us/stocks/{exchange}/{}", ticker.lower()),
                profile: HeaderProfile::Browser,
                timeout: Duration::from_secs(15),
                polite: true,
            })
            .collect()
    }

    fn extract(&self, page: &Page, _ticker: &Ticker) -> Result<SourceReport, Failure> {
        let tags = unique_captures(&COMPANY_TAG, &page.body);
        let ratings = unique_captures(&COMPANY_RATING, &page.body);
        let exchange = Some(exchange_of(&page.url));

        let verdict = from_badges(&ratings, &tags).or_else(|| from_description(&page.body));

        let Some((rating, sentiment)) = verdict else {
            return Ok(StockStoryResult {
                rating: NOT_AVAILABLE.to_string(),
                sentiment: Some(UNKNOWN.to_string()),
                exchange,
                outcome: Outcome {
                    status: "No clear rating found".to_string(),
                    success: false,
                },
            }
            .into());
        };

        Ok(build_success(StockStoryResult {
            rating,
            sentiment: Some(sentiment.to_string()),
            exchange,
            ..Default::default()
        })
        .into())
    }
}
