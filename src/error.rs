//! Common errors across the rpncdf-rs crate

/// Errors related to deriving the valid time from a model file name
#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    #[error("File name '{0}' has no base name or is not valid unicode")]
    NoFileName(String),
    #[error("File name '{name}' does not follow the mYYYYMMDDHH_HHH convention: {cause}")]
    BadFileName { name: String, cause: String },
    #[error("Year {0}, month {1}, day {2}, hour {3} is not a valid UTC time")]
    InvalidDate(i32, u32, u32, u32),
}
