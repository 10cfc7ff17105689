use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("end date {end} must be on or after start date {start}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("comparison period for {start} to {end} falls outside the supported calendar")]
    OutOfRange { start: NaiveDate, end: NaiveDate },
}
