pub mod rating;
pub mod result;
pub mod ticker;

pub use rating::{RatingFamily, RatingVocabulary, ThresholdTable};
pub use result::{Outcome, SourceKey, SourceRecord, SourceReport};
pub use ticker::{Ticker, TickerError};
