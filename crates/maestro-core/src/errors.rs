//! Foundation error types.

use thiserror::Error;

/// Errors from foundation types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An id string did not carry the expected prefix.
    #[error("invalid id `{value}` (expected `{expected_prefix}-…`)")]
    InvalidId {
        /// Prefix the id space requires.
        expected_prefix: &'static str,
        /// The offending value.
        value: String,
    },
}
