//! Error classification shared by every module's error enum.

/// Grepable error code and retryable flag for surfacing failures to the UI.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
