use regex::{Regex, RegexBuilder};
use scraper::Selector;

use crate::domain::rating::RatingVocabulary;
use crate::extract::{stripped_text, PageContent};

/// One extraction attempt: page in, zero or more raw candidates out. Never fails loudly.
pub trait Probe: Send + Sync {
    fn probe(&self, page: &PageContent<'_>) -> Vec<String>;
}

/// Structural query against the DOM.
#[derive(Debug, Clone)]
pub struct SelectorProbe {
    css: &'static str,
    all: bool,
}

impl SelectorProbe {
    /// Only the first matching element.
    pub fn first(css: &'static str) -> Self {
        Self { css, all: false }
    }

    /// Every matching element, in document order.
    pub fn all(css: &'static str) -> Self {
        Self { css, all: true }
    }
}

impl Probe for SelectorProbe {
    fn probe(&self, page: &PageContent<'_>) -> Vec<String> {
        let Ok(selector) = Selector::parse(self.css) else {
            tracing::debug!(css = self.css, "unparseable selector skipped");
            return Vec::new();
        };
        let matches = page.html.select(&selector).map(stripped_text);
        if self.all {
            matches.collect()
        } else {
            matches.take(1).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Concatenated document text.
    Text,
    /// Lower-cased document text.
    Lower,
    /// Response body as received.
    Raw,
}

/// Regex over page text; yields capture group 1 of every match.
#[derive(Debug, Clone)]
pub struct PatternProbe {
    regex: Regex,
    target: Target,
}

impl PatternProbe {
    pub fn new(regex: Regex, target: Target) -> Self {
        Self { regex, target }
    }

    /// Case-insensitive pattern. Returns `None` when the pattern does not compile.
    pub fn insensitive(pattern: &str, target: Target) -> Option<Self> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()
            .map(|regex| Self { regex, target })
    }
}

impl Probe for PatternProbe {
    fn probe(&self, page: &PageContent<'_>) -> Vec<String> {
        let haystack = match self.target {
            Target::Text => page.text.as_str(),
            Target::Lower => page.lower.as_str(),
            Target::Raw => page.raw,
        };
        self.regex
            .captures_iter(haystack)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// Page-wide keyword scan where the keyword must also appear near a context anchor.
///
/// Each template contains a `{keyword}` placeholder that is replaced by the escaped keyword.
/// The resulting patterns are compiled once, here, and matched against the lower-cased page
/// text. Yields at most one label.
#[derive(Debug, Clone)]
pub struct KeywordProbe {
    /// `(keyword, label, context patterns)` in vocabulary order.
    patterns: Vec<(&'static str, &'static str, Vec<Regex>)>,
}

impl KeywordProbe {
    pub fn new(vocabulary: RatingVocabulary, templates: &'static [&'static str]) -> Self {
        let patterns = vocabulary
            .entries()
            .iter()
            .map(|&(keyword, label)| {
                let escaped = regex::escape(keyword);
                let compiled = templates
                    .iter()
                    .filter_map(|template| {
                        let pattern = template.replace("{keyword}", &escaped);
                        Regex::new(&pattern)
                            .inspect_err(|e| tracing::debug!(%pattern, error = %e, "context template skipped"))
                            .ok()
                    })
                    .collect();
                (keyword, label, compiled)
            })
            .collect();
        Self { patterns }
    }
}

impl Probe for KeywordProbe {
    fn probe(&self, page: &PageContent<'_>) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(keyword, _, _)| page.lower.contains(keyword))
            .find(|(_, _, context)| context.iter().any(|re| re.is_match(&page.lower)))
            .map(|(_, label, _)| vec![label.to_string()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rating::FIVE_TIER_OPINION;

    #[test]
    fn selector_probe_first_and_all() {
        let page = PageContent::parse(
            r#"<div class="opinion-a"> Hold </div><div class="opinion-b">Strong <i>Buy</i></div>"#,
        );
        assert_eq!(SelectorProbe::first("[class*=\"opinion\"]").probe(&page), vec!["Hold"]);
        assert_eq!(
            SelectorProbe::all("[class*=\"opinion\"]").probe(&page),
            vec!["Hold", "StrongBuy"]
        );
        assert!(SelectorProbe::first("[[bad").probe(&page).is_empty());
    }

    #[test]
    fn pattern_probe_yields_every_capture() {
        let page = PageContent::parse("<p>Score: 42</p><p>score 7</p>");
        let probe = PatternProbe::insensitive(r"Score[:\s]*(\d+)", Target::Text).unwrap();
        assert_eq!(probe.probe(&page), vec!["42", "7"]);
    }

    #[test]
    fn keyword_probe_requires_context() {
        const TEMPLATES: &[&str] = &[r"(opinion|rating).*?{keyword}"];
        let probe = KeywordProbe::new(FIVE_TIER_OPINION, TEMPLATES);

        let rated = PageContent::parse("<p>Overall opinion: strong sell</p>");
        assert_eq!(probe.probe(&rated), vec!["Strong Sell"]);

        // "buy" appears, but never after an anchor word.
        let unanchored = PageContent::parse("<p>buy our newsletter</p>");
        assert!(probe.probe(&unanchored).is_empty());
    }

    #[test]
    fn keyword_patterns_are_built_up_front() {
        const TEMPLATES: &[&str] = &[r"rating.*?{keyword}", r"({keyword}"];
        let probe = KeywordProbe::new(FIVE_TIER_OPINION, TEMPLATES);

        assert_eq!(probe.patterns.len(), FIVE_TIER_OPINION.entries().len());
        // The unbalanced template never compiles and is dropped for every keyword.
        assert!(probe.patterns.iter().all(|(_, _, context)| context.len() == 1));

        let page = PageContent::parse("<p>Our rating: hold</p>");
        assert_eq!(probe.probe(&page), vec!["Hold"]);
    }
}
