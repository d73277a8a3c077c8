use anyhow::Context;
use rand::Rng;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ratewatch_core::aggregate::Aggregator;
use ratewatch_core::domain::{SourceKey, SourceReport, Ticker};

use crate::summary::{is_blocked, Summary};

/// Columns appended to every input row, in output order.
pub const RATING_COLUMNS: [&str; 12] = [
    "Zacks_Rank",
    "Zacks_Rating",
    "TipRanks_Score",
    "TipRanks_Rating",
    "Barchart_Rating",
    "Stockopedia_StockRank",
    "Stockopedia_Category",
    "Stockopedia_Style",
    "StockAnalysis_Consensus",
    "StockAnalysis_PriceTarget",
    "StockStory_Rating",
    "Last_Updated",
];

/// Sleeps between requests so the sites do not start blocking the run.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub between_sources: Duration,
    pub between_tickers: (Duration, Duration),
    pub after_block: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_sources: Duration::from_secs(1),
            between_tickers: (Duration::from_secs(1), Duration::from_secs(3)),
            after_block: Duration::from_secs(10),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            between_sources: Duration::ZERO,
            between_tickers: (Duration::ZERO, Duration::ZERO),
            after_block: Duration::ZERO,
        }
    }

    fn ticker_pause(&self, blocked: bool) -> Duration {
        if blocked {
            return self.after_block;
        }
        let (lo, hi) = self.between_tickers;
        if hi <= lo {
            return lo;
        }
        let ms = rand::thread_rng().gen_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// `;` when the header line contains one, `,` otherwise.
pub fn detect_delimiter(first_line: &str) -> u8 {
    if first_line.contains(';') {
        b';'
    } else {
        b','
    }
}

/// Index of the explicit column, or of the first header mentioning "symbol" or "ticker".
pub fn find_ticker_column(headers: &csv::StringRecord, explicit: Option<&str>) -> anyhow::Result<usize> {
    if let Some(name) = explicit {
        return headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            .with_context(|| format!("column {name:?} not found in {headers:?}"));
    }
    headers
        .iter()
        .position(|h| {
            let h = h.to_lowercase();
            h.contains("symbol") || h.contains("ticker")
        })
        .with_context(|| format!("no ticker/symbol column in {headers:?}; pass --column"))
}

/// `<stem>_ratings.csv` beside the input.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tickers".to_string());
    input.with_file_name(format!("{stem}_ratings.csv"))
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

/// Cell values for [`RATING_COLUMNS`]. Sources that were not run leave their cells blank.
pub fn rating_cells(results: &BTreeMap<SourceKey, SourceReport>, updated: &str) -> Vec<String> {
    let mut cells = vec![String::new(); RATING_COLUMNS.len()];
    for report in results.values() {
        match report {
            SourceReport::Zacks(r) => {
                cells[0] = r.rank.clone();
                cells[1] = text(r.rating.as_deref());
            }
            SourceReport::TipRanks(r) => {
                cells[2] = r.score.clone();
                cells[3] = text(r.rating.as_deref());
            }
            SourceReport::Barchart(r) => cells[4] = r.rating.clone(),
            SourceReport::Stockopedia(r) => {
                cells[5] = r.stockrank.clone();
                cells[6] = text(r.category.as_deref());
                cells[7] = text(r.style.as_deref());
            }
            SourceReport::StockAnalysis(r) => {
                cells[8] = r.consensus.clone();
                cells[9] = r.price_target.map(|p| format!("{p:.2}")).unwrap_or_default();
            }
            SourceReport::StockStory(r) => cells[10] = r.rating.clone(),
        }
    }
    cells[11] = updated.to_string();
    cells
}

fn short(report: &SourceReport) -> String {
    let mark = if report.success() {
        report.primary()
    } else {
        report.status()
    };
    format!("{}:{}", report.key(), mark)
}

/// Ratings for one ticker, one source at a time.
async fn rate_sequentially(
    aggregator: &Aggregator,
    ticker: &Ticker,
    pacing: &Pacing,
) -> BTreeMap<SourceKey, SourceReport> {
    let mut results = BTreeMap::new();
    for (i, key) in aggregator.keys().into_iter().enumerate() {
        if i > 0 {
            pause(pacing.between_sources).await;
        }
        if let Some(report) = aggregator.collect_one(key, ticker).await {
            results.insert(key, report);
        }
    }
    results
}

#[derive(Debug, Clone, Default)]
pub struct EnrichOptions {
    pub column: Option<String>,
    pub pacing: Option<Pacing>,
}

/// Reads tickers from `input`, appends the rating columns and writes every row to `output`.
pub async fn enrich<R: Read, W: Write>(
    aggregator: &Aggregator,
    input: R,
    output: W,
    delimiter: u8,
    opts: &EnrichOptions,
) -> anyhow::Result<Summary> {
    let pacing = opts.pacing.unwrap_or_else(Pacing::none);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(output);

    let headers = reader.headers().context("read csv header")?.clone();
    let column = find_ticker_column(&headers, opts.column.as_deref())?;
    tracing::info!(column = %&headers[column], "using ticker column");

    let mut header_out = headers.clone();
    for name in RATING_COLUMNS {
        header_out.push_field(name);
    }
    writer.write_record(&header_out)?;

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .context("read csv rows")?;
    let total = records.len();
    let mut summary = Summary::default();

    for (idx, record) in records.into_iter().enumerate() {
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() > headers.len() {
            tracing::warn!(
                row = idx + 1,
                extra = row.len() - headers.len(),
                "row longer than header; extra fields dropped"
            );
        }
        // Rating cells must line up with the appended header names.
        row.resize(headers.len(), String::new());

        // Spreadsheet symbols are only normalized; odd ones still get a try.
        let ticker = Ticker::normalize(record.get(column).unwrap_or_default());
        if ticker.as_str().is_empty() {
            tracing::debug!(row = idx + 1, "blank ticker cell");
            row.extend(std::iter::repeat(String::new()).take(RATING_COLUMNS.len()));
            writer.write_record(&row)?;
            continue;
        }

        let results = rate_sequentially(aggregator, &ticker, &pacing).await;
        let updated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        row.extend(rating_cells(&results, &updated));
        writer.write_record(&row)?;
        summary.record(&ticker, &results);

        let marks: Vec<String> = results.values().map(short).collect();
        tracing::info!(progress = %format!("{}/{}", idx + 1, total), %ticker, results = %marks.join(" | "), "rated");

        let blocked = results.values().any(is_blocked);
        if blocked {
            tracing::warn!(%ticker, pause = ?pacing.after_block, "rate limited, backing off");
        }
        if idx + 1 < total {
            pause(pacing.ticker_pause(blocked)).await;
        }
    }

    writer.flush()?;
    Ok(summary)
}

/// File wrapper around [`enrich`]: detects the delimiter and writes next to the input.
pub async fn enrich_file(
    aggregator: &Aggregator,
    input: &Path,
    output: Option<&Path>,
    opts: &EnrichOptions,
) -> anyhow::Result<(PathBuf, Summary)> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("read {}", input.display()))?;
    let delimiter = detect_delimiter(raw.lines().next().unwrap_or_default());

    let out_path = output.map(Path::to_path_buf).unwrap_or_else(|| output_path(input));
    let file = std::fs::File::create(&out_path)
        .with_context(|| format!("create {}", out_path.display()))?;

    let summary = enrich(aggregator, raw.as_bytes(), file, delimiter, opts).await?;
    Ok((out_path, summary))
}
