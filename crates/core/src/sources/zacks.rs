use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use std::time::Duration;

use crate::domain::rating::{rank_to_rating, NOT_RATED, NOT_RATED_MARK};
use crate::domain::result::{build_success, Outcome, SourceKey, SourceReport, ZacksResult};
use crate::domain::ticker::Ticker;
use crate::extract::{stripped_text, Chain, PageContent, Probe};
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

static RANK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d)-").expect("zacks rank prefix regex must compile"));

/// Rank digit from the `p.rank_view` widget: the `rank_chip` span when it has text,
/// otherwise the leading digit of text like `3-Holdof 53`.
struct RankViewProbe;

impl Probe for RankViewProbe {
    fn probe(&self, page: &PageContent<'_>) -> Vec<String> {
        let (Ok(view), Ok(chip)) = (Selector::parse("p.rank_view"), Selector::parse("span.rank_chip"))
        else {
            return Vec::new();
        };
        let Some(rank_view) = page.html.select(&view).next() else {
            return Vec::new();
        };

        if let Some(chip_text) = rank_view
            .select(&chip)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
        {
            return vec![chip_text];
        }

        RANK_PREFIX
            .captures(&stripped_text(rank_view))
            .and_then(|caps| caps.get(1))
            .map(|m| vec![m.as_str().to_string()])
            .unwrap_or_default()
    }
}

fn accept_rank(candidate: &str) -> Option<(String, &'static str)> {
    rank_to_rating(candidate).map(|rating| (candidate.trim().to_string(), rating))
}

/// Zacks Rank 1..5. Served without the browser profile and without a polite pause.
pub struct Zacks;

impl Zacks {
    fn rank_chain() -> Chain<(String, &'static str)> {
        Chain::new().then(RankViewProbe, accept_rank)
    }
}

impl RatingSource for Zacks {
    fn key(&self) -> SourceKey {
        SourceKey::Zacks
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        vec![FetchRequest {
            url: format!("https://www.zacks.com/stock/quote/{ticker}"),
            profile: HeaderProfile::Standard,
            timeout: Duration::from_secs(10),
            polite: false,
        }]
    }

    fn extract(&self, page: &Page, ticker: &Ticker) -> Result<SourceReport, Failure> {
        let content = PageContent::parse(&page.body);

        if let Some((rank, rating)) = Self::rank_chain().run(&content) {
            return Ok(build_success(ZacksResult {
                rank,
                rating: Some(rating.to_string()),
                ..Default::default()
            })
            .into());
        }

        let listed = content
            .first_html("h1")
            .is_some_and(|h1| h1.contains(ticker.as_str()));
        if !listed {
            return Err(Failure::TickerMismatch);
        }

        Ok(build_success(ZacksResult {
            rank: NOT_RATED_MARK.to_string(),
            rating: Some(NOT_RATED.to_string()),
            outcome: Outcome {
                status: "Stock found but not rated".to_string(),
                success: true,
            },
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
            url: "https://www.zacks.com/stock/quote/AAPL".into(),
            status: 200,
            body: body.into(),
        }
    }

    fn json_of(report: SourceReport) -> serde_json::Value {
        serde_json::to_value(report).unwrap()
    }

    #[test]
    fn reads_rank_chip() {
        let html = r#"<h1>Apple Inc. (AAPL)</h1>
            <p class="rank_view"><span class="rank_chip">2</span>-Buy<span>of 5</span></p>"#;
        let report = Zacks.extract(&page(html), &Ticker::normalize("AAPL")).unwrap();
        assert_eq!(
            json_of(report),
            json!({"rank": "2", "rating": "Buy", "status": "Found", "success": true})
        );
    }

    #[test]
    fn falls_back_to_rank_prefix_when_chip_is_empty() {
        let html = r#"<p class="rank_view"><span class="rank_chip"> </span> 3-Hold <span>of 5</span></p>"#;
        let report = Zacks.extract(&page(html), &Ticker::normalize("AAPL")).unwrap();
        assert_eq!(report.primary(), "3");
        assert!(report.success());
    }

    #[test]
    fn listed_but_unranked() {
        let html = r#"<h1>Tiny Corp (TINY)</h1><p>No rank</p>"#;
        let report = Zacks.extract(&page(html), &Ticker::normalize("TINY")).unwrap();
        assert_eq!(
            json_of(report),
            json!({"rank": "NR", "rating": "Not Rated", "status": "Stock found but not rated", "success": true})
        );
    }

    #[test]
    fn unrelated_page_is_not_found() {
        let html = r#"<h1>Search results</h1>"#;
        let err = Zacks.extract(&page(html), &Ticker::normalize("ZZZZ")).unwrap_err();
        assert_eq!(err, Failure::TickerMismatch);
        assert_eq!(err.status(), "Stock not found");
    }
}
