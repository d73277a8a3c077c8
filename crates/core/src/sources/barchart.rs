use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::time::Duration;

use crate::domain::rating::{compatible, FIVE_TIER_OPINION, NOT_RATED};
use crate::domain::result::{build_success, BarchartResult, Outcome, SourceKey, SourceReport};
use crate::domain::ticker::Ticker;
use crate::extract::{validate_page, Chain, KeywordProbe, PageContent, SelectorProbe};
use crate::fetch::{FetchRequest, HeaderProfile, Page};
use crate::sources::{Failure, RatingSource};

const OPINION_SELECTORS: [&str; 8] = [
    r#"[class*="opinion"]"#,
    r#"[class*="signal"]"#,
    r#"[class*="rating"]"#,
    r#"[class*="recommendation"]"#,
    r#"[data-ng-bind*="opinion"]"#,
    ".bc-opinion",
    ".opinion-text",
    r#"[class*="analyst"]"#,
];

/// Unclassed cells and spans that may hold nothing but the opinion word.
const BARE_OPINION_ELEMENTS: &str = "span, div, td";

const CONTEXT_TEMPLATES: &[&str] = &[
    r"(opinion|signal|rating|recommendation|consensus|analyst).*?{keyword}",
    r"{keyword}.*?(opinion|signal|rating|recommendation)",
    r"barchart.*?{keyword}",
    r"{keyword}.*?barchart",
];

static PERCENT_OPINION: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"(\d{1,3})%\s*(strong buy|buy|hold|sell|strong sell)")
        .case_insensitive(true)
        .build()
        .expect("barchart percent opinion regex must compile")
});

fn accept_whole_word(text: &str) -> Option<&'static str> {
    FIVE_TIER_OPINION.keyword_to_rating_word(text)
}

/// Element text that is exactly one opinion term, e.g. `Buy` or `Strong  Sell`.
fn accept_exact_term(text: &str) -> Option<&'static str> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    FIVE_TIER_OPINION
        .entries()
        .iter()
        .find(|(keyword, _)| *keyword == normalized)
        .map(|(_, label)| *label)
}

fn accept_label(text: &str) -> Option<&'static str> {
    FIVE_TIER_OPINION
        .entries()
        .iter()
        .find(|(_, label)| *label == text)
        .map(|(_, label)| *label)
}

/// Opinion strength such as `88% Buy`, kept only when it agrees with `rating`.
fn percent_opinion(text: &str, rating: &str) -> Option<(String, String)> {
    PERCENT_OPINION.captures_iter(text).find_map(|caps| {
        let pct: u32 = caps.get(1)?.as_str().parse().ok()?;
        let label = FIVE_TIER_OPINION.keyword_to_rating(caps.get(2)?.as_str())?;
        if pct > 100 || !compatible(label, rating) {
            return None;
        }
        Some((format!("{pct}%"), caps.get(0)?.as_str().trim().to_string()))
    })
}

/// Five-tier opinion from the overview page.
pub struct Barchart {
    rating: Chain<&'static str>,
}

impl Default for Barchart {
    fn default() -> Self {
        Self::new()
    }
}

impl Barchart {
    pub fn new() -> Self {
        let mut rating = Chain::new();
        for css in OPINION_SELECTORS {
            rating = rating.then(SelectorProbe::all(css), accept_whole_word);
        }
        rating = rating.then(SelectorProbe::all(BARE_OPINION_ELEMENTS), accept_exact_term);
        rating = rating.then(
            KeywordProbe::new(FIVE_TIER_OPINION, CONTEXT_TEMPLATES),
            accept_label,
        );
        Self { rating }
    }
}

impl RatingSource for Barchart {
    fn key(&self) -> SourceKey {
        SourceKey::Barchart
    }

    fn requests(&self, ticker: &Ticker) -> Vec<FetchRequest> {
        vec![FetchRequest {
            url: format!(
                "https://www.barchart.com/stocks/quotes/{}/overview",
                ticker.lower()
            ),
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

        if !title.contains(ticker.as_str()) {
            return Err(Failure::TickerMismatch);
        }

        let Some(rating) = self.rating.run(&content) else {
            return Ok(build_success(BarchartResult {
                rating: NOT_RATED.to_string(),
                outcome: Outcome {
                    status: "Stock found but no rating".to_string(),
                    success: true,
                },
                ..Default::default()
            })
            .into());
        };

        let (score, opinion_text) = match percent_opinion(&content.text, rating) {
            Some((score, opinion)) => (Some(score), Some(opinion)),
            None => (None, None),
        };

        Ok(build_success(BarchartResult {
            rating: rating.to_string(),
            score,
            opinion_text,
            ..Default::default()
        })
        .into())
    }
}
