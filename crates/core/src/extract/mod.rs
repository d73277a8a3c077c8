//! Page content plus the ordered probe chains each source configures.

pub mod probe;
pub mod validate;

pub use probe::{KeywordProbe, PatternProbe, Probe, SelectorProbe, Target};
pub use validate::{ticker_in_title, validate_page, PageCheck};

use scraper::{Html, Selector};

/// A parsed page: the raw body, its DOM, and the concatenated document text.
pub struct PageContent<'a> {
    pub raw: &'a str,
    pub html: Html,
    pub text: String,
    pub lower: String,
}

impl<'a> PageContent<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let html = Html::parse_document(raw);
        let text: String = html.root_element().text().collect();
        let lower = text.to_lowercase();
        Self {
            raw,
            html,
            text,
            lower,
        }
    }

    /// Text of the first `<title>`, if the page has one.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
    }

    /// Outer HTML of the first element matching `css`.
    pub fn first_html(&self, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        self.html.select(&selector).next().map(|el| el.html())
    }
}

/// Stripped text of an element, joined without separators.
pub fn stripped_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

struct Step<T> {
    probe: Box<dyn Probe>,
    accept: fn(&str) -> Option<T>,
}

/// Probes tried in order; the first candidate an acceptor turns into a value wins.
pub struct Chain<T> {
    steps: Vec<Step<T>>,
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T> Chain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, probe: impl Probe + 'static, accept: fn(&str) -> Option<T>) -> Self {
        self.steps.push(Step {
            probe: Box::new(probe),
            accept,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&self, page: &PageContent<'_>) -> Option<T> {
        self.steps.iter().find_map(|step| {
            step.probe
                .probe(page)
                .iter()
                .find_map(|candidate| (step.accept)(candidate.as_str()))
        })
    }
}

/// First integer in `text`, kept only inside `1..=10`.
pub fn score_in_range(text: &str) -> Option<String> {
    first_number(text)
        .filter(|n| (1..=10).contains(n))
        .map(|n| n.to_string())
}

pub fn first_number(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Apple (AAPL) Stock</title></head>
        <body><div class="score-box"> Smart <b>Score</b> 42 </div>
        <span class="smart-score">8</span></body></html>"#;

    #[test]
    fn page_content_exposes_title_and_text() {
        let page = PageContent::parse(PAGE);
        assert_eq!(page.title().as_deref(), Some("Apple (AAPL) Stock"));
        assert!(page.lower.contains("smart score"));
    }

    #[test]
    fn chain_skips_rejected_candidates() {
        let page = PageContent::parse(PAGE);
        let chain = Chain::new()
            .then(SelectorProbe::first(".score-box"), score_in_range)
            .then(SelectorProbe::first("[class*=\"smart-score\"]"), score_in_range);
        assert_eq!(chain.len(), 2);
        // 42 is out of range, so the second probe decides.
        assert_eq!(chain.run(&page).as_deref(), Some("8"));
    }

    #[test]
    fn empty_chain_yields_nothing() {
        let page = PageContent::parse(PAGE);
        let chain: Chain<String> = Chain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.run(&page), None);
    }

    #[test]
    fn first_number_reads_leading_digits() {
        assert_eq!(first_number("Score: 8/10"), Some(8));
        assert_eq!(first_number("none"), None);
        assert_eq!(score_in_range("11"), None);
        assert_eq!(score_in_range("10"), Some("10".to_string()));
    }
}
