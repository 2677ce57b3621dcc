//! Custom error types for the measurement engine.
//!
//! Probe failures, orchestration failures and configuration problems all
//! share one error type so they can be classified, logged and, where the
//! user needs to see them, rendered with a suggestion.

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// Remote endpoint returned an error response.
    pub const PROTOCOL_ERROR: i32 = 2;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// Measurement finished but some values were rejected or synthetic.
    pub const PARTIAL_FAILURE: i32 = 4;
    /// The run finished but could not be written to disk.
    pub const EXPORT_ERROR: i32 = 5;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur while measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network connectivity issues.
    Network,
    /// DNS resolution failures.
    Dns,
    /// Connection timeout.
    Timeout,
    /// TLS/SSL handshake failures.
    Tls,
    /// Endpoint answered with a non-success status.
    Protocol,
    /// Measured value outside of sane bounds.
    Validation,
    /// Every endpoint in a fallback chain failed.
    Exhausted,
    /// Invalid configuration or arguments.
    Config,
    /// Writing the run export failed.
    Export,
    /// Unexpected failure inside the orchestration tick.
    Critical,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Network => exit_codes::NETWORK_ERROR,
            ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Timeout => exit_codes::NETWORK_ERROR,
            ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Protocol => exit_codes::PROTOCOL_ERROR,
            ErrorKind::Validation => exit_codes::PARTIAL_FAILURE,
            ErrorKind::Exhausted => exit_codes::NETWORK_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Export => exit_codes::EXPORT_ERROR,
            ErrorKind::Critical => exit_codes::UNKNOWN_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Connection timeout",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Protocol => "Protocol error",
            ErrorKind::Validation => "Validation error",
            ErrorKind::Exhausted => "All endpoints failed",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Export => "Export error",
            ErrorKind::Critical => "Critical error",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Whether this failure came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Dns
                | ErrorKind::Timeout
                | ErrorKind::Tls
                | ErrorKind::Unknown
        )
    }

    /// Whether a probe failing with this kind should move on to the next
    /// endpoint of its fallback chain.
    pub fn should_fall_back(&self) -> bool {
        self.is_transport() || *self == ErrorKind::Protocol
    }
}

/// A user-friendly error type for measurement operations.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// Create a new SpeedTestError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check your internet connection and try again.")
    }

    /// Create a protocol error for a non-success HTTP status.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Create a validation error for an implausible measurement.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an exhaustion error wrapping the last endpoint failure.
    pub fn exhausted(message: impl Into<String>, last: SpeedTestError) -> Self {
        Self::new(ErrorKind::Exhausted, message)
            .with_suggestion(
                "Every measurement endpoint failed. Check your connection \
                 or configure different endpoints.",
            )
            .with_source(last)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create an export error.
    pub fn export(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Export, message).with_suggestion(
            "Check that the output directory exists and is writable.",
        )
    }

    /// Create a critical orchestration error.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Critical, message)
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for SpeedTestError {
    fn from(error: reqwest::Error) -> Self {
        let kind = classify_reqwest_error(&error);
        let message = match error.url() {
            Some(url) => format!(
                "request to {} failed: {}",
                url.host_str().unwrap_or("endpoint"),
                error
            ),
            None => format!("request failed: {}", error),
        };

        SpeedTestError::new(kind, message).with_source(error)
    }
}

/// Classify a reqwest error using its structured flags, falling back to
/// the message text for causes reqwest does not expose directly.
pub fn classify_reqwest_error(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        return ErrorKind::Timeout;
    }

    if error.is_status() {
        return ErrorKind::Protocol;
    }

    match classify_error(error) {
        ErrorKind::Unknown if error.is_connect() => ErrorKind::Network,
        ErrorKind::Unknown if error.is_body() || error.is_request() => {
            ErrorKind::Network
        }
        kind => kind,
    }
}

/// Classify an error into an ErrorKind based on its message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let mut error_str = error.to_string().to_lowercase();

    let mut source = error.source();
    while let Some(inner) = source {
        error_str.push(' ');
        error_str.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("server error")
    {
        return ErrorKind::Protocol;
    }

    ErrorKind::Unknown
}

/// Format an error for user display.
///
/// This function creates a user-friendly error message that includes
/// the error description and any available suggestions.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Dns.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Protocol.exit_code(), exit_codes::PROTOCOL_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Export.exit_code(), exit_codes::EXPORT_ERROR);
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(ErrorKind::Network.should_fall_back());
        assert!(ErrorKind::Timeout.should_fall_back());
        assert!(ErrorKind::Protocol.should_fall_back());
        assert!(!ErrorKind::Validation.should_fall_back());
        assert!(!ErrorKind::Exhausted.should_fall_back());
        assert!(!ErrorKind::Protocol.is_transport());
    }

    #[test]
    fn test_speed_test_error_display() {
        let error = SpeedTestError::network("Failed to connect to server")
            .with_suggestion("Check your internet connection.");

        let display = format!("{}", error);
        assert!(display.contains("Network error"));
        assert!(display.contains("Failed to connect"));
        assert!(display.contains("Suggestion"));
    }

    #[test]
    fn test_exhausted_keeps_last_error_as_source() {
        let last = SpeedTestError::protocol("HTTP 503");
        let error = SpeedTestError::exhausted("download 1MB", last);

        assert_eq!(error.kind, ErrorKind::Exhausted);
        let source = error.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("HTTP 503"));
    }

    #[test]
    fn test_classify_error_dns() {
        let error = std::io::Error::new(
            std::io::ErrorKind::Other,
            "DNS resolution failed: no such host",
        );
        assert_eq!(classify_error(&error), ErrorKind::Dns);
    }

    #[test]
    fn test_classify_error_timeout() {
        let error = std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        );
        assert_eq!(classify_error(&error), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_error_network() {
        let error = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        );
        assert_eq!(classify_error(&error), ErrorKind::Network);
    }

    #[test]
    fn test_classify_error_walks_source_chain() {
        let inner = std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        );
        let outer = SpeedTestError::new(ErrorKind::Unknown, "upload failed")
            .with_source(inner);
        assert_eq!(classify_error(&outer), ErrorKind::Network);
    }

    #[test]
    fn test_classify_error_unknown() {
        let error = std::io::Error::new(
            std::io::ErrorKind::Other,
            "some random error",
        );
        assert_eq!(classify_error(&error), ErrorKind::Unknown);
    }

    #[test]
    fn test_format_error_for_display() {
        let error = SpeedTestError::export("could not create file");
        let output = format_error_for_display(&error);
        assert!(output.starts_with("Error: could not create file"));
        assert!(output.contains("Suggestion:"));
    }
}
