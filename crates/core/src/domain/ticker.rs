use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffixes that mark a symbol as a foreign ADR / OTC listing.
pub const FOREIGN_SUFFIXES: [&str; 9] = ["F", "Y", "FF", "ZY", "GY", "SY", "UY", "IY", "LY"];

static TICKER_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{1,5}(\.[A-Z]{1,2})?$").expect("ticker format regex must compile"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickerError {
    #[error("Please enter a ticker symbol")]
    Empty,
    #[error("Invalid ticker symbol format")]
    InvalidFormat(String),
}

/// Exchange symbol, always upper-case and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Upper-cases and trims without any syntax check.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Normalizes, then rejects empty input and symbols outside `AAAAA[.BB]`.
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let ticker = Self::normalize(raw);
        if ticker.0.is_empty() {
            return Err(TickerError::Empty);
        }
        if !TICKER_FORMAT.is_match(&ticker.0) {
            return Err(TickerError::InvalidFormat(ticker.0));
        }
        Ok(ticker)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lower(&self) -> String {
        self.0.to_lowercase()
    }

    /// Same symbol with share-class dots removed (`BRK.B` -> `BRKB`).
    pub fn without_dots(&self) -> String {
        self.0.replace('.', "")
    }

    pub fn is_foreign_or_otc(&self) -> bool {
        FOREIGN_SUFFIXES.iter().any(|suffix| self.0.ends_with(suffix))
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["  aapl ", "brk.b", "MSFT", "", "\tnvda\n"] {
            let once = Ticker::normalize(raw);
            let twice = Ticker::normalize(once.as_str());
            assert_eq!(once, twice);
        }
        assert_eq!(Ticker::normalize("  aapl ").as_str(), "AAPL");
    }

    #[test]
    fn foreign_suffixes_are_detected() {
        for suffix in FOREIGN_SUFFIXES {
            let t = Ticker::normalize(&format!("ABC{suffix}"));
            assert!(t.is_foreign_or_otc(), "{t} should be foreign");
        }
        assert!(!Ticker::normalize("AAPL").is_foreign_or_otc());
        assert!(!Ticker::normalize("MSFT").is_foreign_or_otc());
    }

    #[test]
    fn parse_rejects_empty_and_malformed() {
        assert_eq!(Ticker::parse("   "), Err(TickerError::Empty));
        assert!(matches!(
            Ticker::parse("TOOLONG"),
            Err(TickerError::InvalidFormat(_))
        ));
        assert!(matches!(Ticker::parse("AB1"), Err(TickerError::InvalidFormat(_))));
        assert_eq!(Ticker::parse("brk.b").unwrap().as_str(), "BRK.B");
        assert_eq!(Ticker::parse("brk.b").unwrap().without_dots(), "BRKB");
    }
}
