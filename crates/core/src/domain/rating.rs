//! Canonical rating labels and the tables that map raw page tokens onto them.

pub const NOT_AVAILABLE: &str = "N/A";
pub const NOT_RATED: &str = "Not Rated";
pub const NOT_RATED_MARK: &str = "NR";

/// Closed keyword -> label mapping. Lookups are case-insensitive substring matches and the
/// first entry (in declaration order) that occurs in the text wins.
#[derive(Debug, Clone, Copy)]
pub struct RatingVocabulary {
    entries: &'static [(&'static str, &'static str)],
}

impl RatingVocabulary {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    /// Returns the label for the first keyword found anywhere in `text`.
    pub fn keyword_to_rating(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, label)| *label)
    }

    /// Like [`Self::keyword_to_rating`], but the keyword must stand as a whole word.
    pub fn keyword_to_rating_word(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| contains_word(&lower, keyword))
            .map(|(_, label)| *label)
    }
}

pub fn keyword_to_rating(text: &str, vocabulary: &RatingVocabulary) -> Option<&'static str> {
    vocabulary.keyword_to_rating(text)
}

/// Three-tier vocabulary (Outperform / Neutral / Underperform).
pub const THREE_TIER: RatingVocabulary = RatingVocabulary::new(&[
    ("outperform", "Outperform"),
    ("neutral", "Neutral"),
    ("underperform", "Underperform"),
    ("bullish", "Outperform"),
    ("bearish", "Underperform"),
    ("buy", "Outperform"),
    ("sell", "Underperform"),
    ("hold", "Neutral"),
    ("positive", "Outperform"),
    ("negative", "Underperform"),
]);

/// Five-tier vocabulary used for opinion widgets.
pub const FIVE_TIER_OPINION: RatingVocabulary = RatingVocabulary::new(&[
    ("strong buy", "Strong Buy"),
    ("strongbuy", "Strong Buy"),
    ("buy", "Buy"),
    ("strong sell", "Strong Sell"),
    ("strongsell", "Strong Sell"),
    ("sell", "Sell"),
    ("hold", "Hold"),
    ("neutral", "Hold"),
    ("bullish", "Buy"),
    ("bearish", "Sell"),
    ("overweight", "Buy"),
    ("underweight", "Sell"),
    ("outperform", "Buy"),
    ("underperform", "Sell"),
    ("positive", "Buy"),
    ("negative", "Sell"),
]);

/// Five-tier vocabulary used for analyst consensus sentences.
pub const FIVE_TIER_CONSENSUS: RatingVocabulary = RatingVocabulary::new(&[
    ("strong buy", "Strong Buy"),
    ("buy", "Buy"),
    ("hold", "Hold"),
    ("sell", "Sell"),
    ("strong sell", "Strong Sell"),
    ("bullish", "Buy"),
    ("bearish", "Sell"),
    ("neutral", "Hold"),
]);

/// Step table: a value maps to the label of the highest threshold it meets or exceeds.
/// Values below every step fall through to `floor`.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdTable {
    steps: &'static [(i64, &'static str)],
    floor: Option<&'static str>,
}

impl ThresholdTable {
    pub const fn new(steps: &'static [(i64, &'static str)], floor: Option<&'static str>) -> Self {
        Self { steps, floor }
    }

    pub fn classify(&self, value: i64) -> Option<&'static str> {
        self.steps
            .iter()
            .filter(|(threshold, _)| value >= *threshold)
            .max_by_key(|(threshold, _)| *threshold)
            .map(|(_, label)| *label)
            .or(self.floor)
    }
}

/// 1..10 scores: >=8 Outperform, >=5 Neutral, >=0 Underperform.
pub const DEFAULT_SCORE_TABLE: ThresholdTable = ThresholdTable::new(
    &[(8, "Outperform"), (5, "Neutral"), (0, "Underperform")],
    None,
);

/// 0..100 ranks, five bands.
pub const RANK_BANDS: ThresholdTable = ThresholdTable::new(
    &[(80, "Excellent"), (60, "Good"), (40, "Average"), (20, "Poor")],
    Some("Very Poor"),
);

/// `"N/A"` when `score` is not an integer or sits below every threshold.
pub fn score_to_rating(score: &str, table: &ThresholdTable) -> &'static str {
    score
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|v| table.classify(v))
        .unwrap_or(NOT_AVAILABLE)
}

pub fn score_to_category(rank: i64, bands: &ThresholdTable) -> &'static str {
    bands.classify(rank).unwrap_or(NOT_AVAILABLE)
}

/// Zacks-style 1..5 rank digit.
pub fn rank_to_rating(rank: &str) -> Option<&'static str> {
    match rank.trim() {
        "1" => Some("Strong Buy"),
        "2" => Some("Buy"),
        "3" => Some("Hold"),
        "4" => Some("Sell"),
        "5" => Some("Strong Sell"),
        _ => None,
    }
}

/// Broad direction shared by the three- and five-tier label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatingFamily {
    Buy,
    Hold,
    Sell,
}

impl RatingFamily {
    pub fn of(label: &str) -> Option<Self> {
        match label {
            "Strong Buy" | "Buy" | "Outperform" => Some(Self::Buy),
            "Hold" | "Neutral" => Some(Self::Hold),
            "Sell" | "Strong Sell" | "Underperform" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Two labels are compatible when both belong to the same known family.
pub fn compatible(a: &str, b: &str) -> bool {
    match (RatingFamily::of(a), RatingFamily::of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// ASCII word-boundary containment, equivalent to `\bword\b` for the vocabularies above.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let is_word_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).any(|(start, m)| {
        let end = start + m.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_to_rating_default_table() {
        assert_eq!(score_to_rating("8", &DEFAULT_SCORE_TABLE), "Outperform");
        assert_eq!(score_to_rating("10", &DEFAULT_SCORE_TABLE), "Outperform");
        assert_eq!(score_to_rating("5", &DEFAULT_SCORE_TABLE), "Neutral");
        assert_eq!(score_to_rating("7", &DEFAULT_SCORE_TABLE), "Neutral");
        assert_eq!(score_to_rating("0", &DEFAULT_SCORE_TABLE), "Underperform");
        assert_eq!(score_to_rating("abc", &DEFAULT_SCORE_TABLE), "N/A");
        assert_eq!(score_to_rating("-1", &DEFAULT_SCORE_TABLE), "N/A");
    }

    #[test]
    fn category_bands_include_boundaries() {
        assert_eq!(score_to_category(85, &RANK_BANDS), "Excellent");
        assert_eq!(score_to_category(80, &RANK_BANDS), "Excellent");
        assert_eq!(score_to_category(60, &RANK_BANDS), "Good");
        assert_eq!(score_to_category(40, &RANK_BANDS), "Average");
        assert_eq!(score_to_category(39, &RANK_BANDS), "Poor");
        assert_eq!(score_to_category(20, &RANK_BANDS), "Poor");
        assert_eq!(score_to_category(5, &RANK_BANDS), "Very Poor");
    }

    #[test]
    fn first_keyword_in_declaration_order_wins() {
        let vocab = RatingVocabulary::new(&[("bullish", "Outperform"), ("buy", "Hold")]);
        assert_eq!(
            keyword_to_rating("the analyst is bullish, buy now", &vocab),
            Some("Outperform")
        );
        assert_eq!(keyword_to_rating("BUY", &vocab), Some("Hold"));
        assert_eq!(keyword_to_rating("nothing here", &vocab), None);
    }

    #[test]
    fn five_tier_prefers_strong_variants() {
        assert_eq!(FIVE_TIER_OPINION.keyword_to_rating("Strong Buy"), Some("Strong Buy"));
        assert_eq!(FIVE_TIER_OPINION.keyword_to_rating("strong sell"), Some("Strong Sell"));
        assert_eq!(THREE_TIER.keyword_to_rating("Bearish"), Some("Underperform"));
    }

    #[test]
    fn whole_word_match_skips_embedded_keywords() {
        assert_eq!(FIVE_TIER_OPINION.keyword_to_rating_word("buyback program"), None);
        assert_eq!(FIVE_TIER_OPINION.keyword_to_rating_word("opinion: buy"), Some("Buy"));
        assert!(contains_word("88% buy", "buy"));
        assert!(!contains_word("buyers", "buy"));
    }

    #[test]
    fn families_decide_compatibility() {
        assert!(compatible("Strong Buy", "Buy"));
        assert!(compatible("Outperform", "Buy"));
        assert!(!compatible("Buy", "Sell"));
        assert!(!compatible("Buy", "N/A"));
        assert_eq!(rank_to_rating("3"), Some("Hold"));
        assert_eq!(rank_to_rating("6"), None);
    }
}
