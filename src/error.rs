//! Shared error-code contract.
//!
//! Every service error and client-side domain error implements `ErrorCode`
//! so HTTP responses and CLI output carry the same grepable `E_*` codes.

/// Trait for errors that carry a stable machine-readable code.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
