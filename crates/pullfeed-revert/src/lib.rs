//! # pullfeed-revert
//!
//! Classification of revert payloads raised by contracts that need oracle
//! data before they can answer.
//!
//! ## Modules
//!
//! - [`classify`]: selector table, the [`StructuredError`] sum type and
//!   recursive expansion of wrapped error lists
//! - [`query`]: decoding of the oracle query bytes carried inside an
//!   oracle-data-required error
//!
//! Classification itself never fails: anything that does not decode under
//! one of the known layouts is [`StructuredError::Unclassified`], which the
//! caller must treat as fatal.

pub mod classify;
pub mod query;

pub use classify::{
    classify, encode_errors, encode_oracle_data_required, is_sequencing_stale, revert_reason,
    StructuredError,
};
pub use query::{decode_query, encode_query};

/// Error types for oracle query decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RevertError {
    /// Payload is shorter than the layout requires.
    #[error("truncated payload: need {required} bytes, have {available}")]
    Truncated {
        /// Minimum number of bytes required.
        required: usize,
        /// Number of bytes present.
        available: usize,
    },

    /// Payload does not decode under the layout selected by its update type.
    #[error("layout mismatch: {0}")]
    Layout(String),
}

/// Result type alias for revert decoding.
pub type Result<T> = std::result::Result<T, RevertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RevertError::Truncated {
            required: 32,
            available: 4,
        };
        assert_eq!(err.to_string(), "truncated payload: need 32 bytes, have 4");
    }
}
