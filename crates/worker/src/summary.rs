use std::collections::BTreeMap;
use std::fmt;

use ratewatch_core::domain::rating::{RatingFamily, NOT_RATED};
use ratewatch_core::domain::result::FOUND;
use ratewatch_core::domain::{SourceKey, SourceReport, Ticker};

/// Where one source's answer for one ticker lands in the statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bucket {
    Rated(String),
    NotRated,
    NotFound,
    RateLimited,
    Timeout,
    Foreign,
    Error,
}

/// Label counted for a found record: the rating word where the source has one.
pub fn rated_label(report: &SourceReport) -> Option<&str> {
    match report {
        SourceReport::Zacks(r) => r.rating.as_deref(),
        SourceReport::TipRanks(r) => r.rating.as_deref(),
        SourceReport::Barchart(r) => Some(r.rating.as_str()),
        SourceReport::Stockopedia(r) => r.category.as_deref(),
        SourceReport::StockAnalysis(r) => Some(r.consensus.as_str()),
        SourceReport::StockStory(r) => r.sentiment.as_deref(),
    }
}

pub fn classify(report: &SourceReport) -> Bucket {
    if report.success() {
        if report.status() != FOUND {
            return Bucket::NotRated;
        }
        return match rated_label(report) {
            Some(label) if label != NOT_RATED => Bucket::Rated(label.to_string()),
            _ => Bucket::NotRated,
        };
    }

    match report.status() {
        "Foreign ticker" => Bucket::Foreign,
        "Too many requests" | "Site blocking requests" | "Access forbidden" => Bucket::RateLimited,
        "Request timeout" => Bucket::Timeout,
        "Stock not found" | "Invalid page" => Bucket::NotFound,
        _ => Bucket::Error,
    }
}

/// Rate limiting or blocking; the batch driver backs off after these.
pub fn is_blocked(report: &SourceReport) -> bool {
    matches!(
        report.status(),
        "Too many requests" | "Site blocking requests"
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub labels: BTreeMap<String, usize>,
    pub not_rated: usize,
    pub not_found: usize,
    pub rate_limited: usize,
    pub timeout: usize,
    pub foreign: usize,
    pub error: usize,
}

impl SourceStats {
    pub fn record(&mut self, report: &SourceReport) {
        match classify(report) {
            Bucket::Rated(label) => *self.labels.entry(label).or_default() += 1,
            Bucket::NotRated => self.not_rated += 1,
            Bucket::NotFound => self.not_found += 1,
            Bucket::RateLimited => self.rate_limited += 1,
            Bucket::Timeout => self.timeout += 1,
            Bucket::Foreign => self.foreign += 1,
            Bucket::Error => self.error += 1,
        }
    }

    pub fn rated(&self) -> usize {
        self.labels.values().sum()
    }

    pub fn family(&self, family: RatingFamily) -> usize {
        self.labels
            .iter()
            .filter(|(label, _)| RatingFamily::of(label) == Some(family))
            .map(|(_, n)| n)
            .sum()
    }
}

/// Sources whose ratings are compared for cross-site agreement.
pub const CONSENSUS_SOURCES: [SourceKey; 3] =
    [SourceKey::Zacks, SourceKey::TipRanks, SourceKey::Barchart];

#[derive(Debug, Default)]
pub struct Summary {
    pub total: usize,
    pub per_source: BTreeMap<SourceKey, SourceStats>,
    pub triple_buy: Vec<Ticker>,
    pub dual_buy: Vec<Ticker>,
    pub triple_sell: Vec<Ticker>,
}

impl Summary {
    pub fn record(&mut self, ticker: &Ticker, results: &BTreeMap<SourceKey, SourceReport>) {
        self.total += 1;
        for (key, report) in results {
            self.per_source.entry(*key).or_default().record(report);
        }

        let families: Vec<Option<RatingFamily>> = CONSENSUS_SOURCES
            .iter()
            .map(|key| match results.get(key).map(classify) {
                Some(Bucket::Rated(label)) => RatingFamily::of(&label),
                _ => None,
            })
            .collect();
        let count = |f: RatingFamily| families.iter().filter(|x| **x == Some(f)).count();

        let buys = count(RatingFamily::Buy);
        if buys == CONSENSUS_SOURCES.len() {
            self.triple_buy.push(ticker.clone());
        } else if buys == 2 {
            self.dual_buy.push(ticker.clone());
        }
        if count(RatingFamily::Sell) == CONSENSUS_SOURCES.len() {
            self.triple_sell.push(ticker.clone());
        }
    }
}

fn join(tickers: &[Ticker]) -> String {
    tickers
        .iter()
        .map(Ticker::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total tickers processed: {}", self.total)?;
        for (key, stats) in &self.per_source {
            writeln!(f)?;
            writeln!(f, "{key}: {} rated", stats.rated())?;
            for (label, n) in &stats.labels {
                writeln!(f, "  {label}: {n}")?;
            }
            let misses = [
                ("Not rated", stats.not_rated),
                ("Not found", stats.not_found),
                ("Rate limited", stats.rate_limited),
                ("Timeout", stats.timeout),
                ("Foreign/OTC", stats.foreign),
                ("Error", stats.error),
            ];
            for (name, n) in misses.into_iter().filter(|(_, n)| *n > 0) {
                writeln!(f, "  {name}: {n}")?;
            }
            if stats.rated() > 0 {
                writeln!(
                    f,
                    "  buy {} / hold {} / sell {}",
                    stats.family(RatingFamily::Buy),
                    stats.family(RatingFamily::Hold),
                    stats.family(RatingFamily::Sell)
                )?;
            }
        }

        let sections = [
            ("Triple buy consensus", &self.triple_buy),
            ("Dual buy consensus", &self.dual_buy),
            ("Triple sell consensus", &self.triple_sell),
        ];
        for (name, tickers) in sections {
            if !tickers.is_empty() {
                writeln!(f)?;
                writeln!(f, "{name} ({}): {}", tickers.len(), join(tickers))?;
            }
        }
        Ok(())
    }
}
