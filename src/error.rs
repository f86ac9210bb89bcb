//! # Error Handling
//!
//! Hierarchical error type for the scrolling-frame render pipeline.
//!
//! ## Architecture
//!
//! - **Error Types**: `RenderError` carries one variant per failure kind the
//!   pipeline can raise, each with an `ErrorContext` for narration.
//! - **Error Traits**: `Retryable`, `Recoverable`, `HasSeverity`, and
//!   `HasRecoverySuggestion` let callers branch on error category without
//!   matching every variant by hand.
//! - **Error Context**: timestamp, operation, free-form context, recovery
//!   suggestion, and severity travel with every error.
//!
//! ## Usage
//!
//! ```rust
//! use scrollreel::error::{RenderError, Retryable};
//!
//! let error = RenderError::config("scroll_speed", "0.1", "must be >= 0.5")
//!     .with_context("validating render parameters");
//!
//! assert!(!error.is_retryable());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, does not affect the render.
    Info,
    /// Recoverable, the pipeline degrades or retries.
    Warning,
    /// Affects the current render but does not corrupt prior output.
    Error,
    /// Requires tearing down the whole pipeline.
    Critical,
    /// Unrecoverable; no retry is attempted.
    Fatal,
}

/// Metadata describing when and why an error occurred.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub operation: Option<String>,
    pub context: Option<String>,
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub recoverable: bool,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }
}

/// The seven failure kinds the render pipeline distinguishes.
#[derive(Debug)]
pub enum RenderError {
    /// Invalid parameters, raised before any child process is spawned.
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Source bitmap smaller than the viewport, or not RGBA.
    Source {
        reason: String,
        context: ErrorContext,
    },
    /// The encoder child process could not be launched.
    EncoderSpawn {
        program: String,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// The encoder child process exited non-zero.
    EncoderExit {
        code: Option<i32>,
        stderr_tail: String,
        context: ErrorContext,
    },
    /// A broken pipe while writing a frame to the encoder's stdin.
    Pipe {
        frames_written: u64,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// The watchdog fired: no progress, or the encoder didn't exit in time.
    Timeout {
        operation: String,
        elapsed_secs: u64,
        context: ErrorContext,
    },
    /// A worker thread failed; the pipeline aborted.
    Worker {
        frame_index: u64,
        reason: String,
        context: ErrorContext,
    },
}

impl RenderError {
    pub fn config(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    pub fn source(reason: impl Into<String>) -> Self {
        Self::Source {
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    pub fn encoder_spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::EncoderSpawn {
            program: program.into(),
            source,
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }

    pub fn encoder_exit(code: Option<i32>, stderr_tail: impl Into<String>) -> Self {
        Self::EncoderExit {
            code,
            stderr_tail: stderr_tail.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }

    pub fn pipe(frames_written: u64, source: std::io::Error) -> Self {
        Self::Pipe {
            frames_written,
            source,
            context: ErrorContext::new()
                .with_severity(ErrorSeverity::Critical)
                .recoverable(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }

    pub fn worker(frame_index: u64, reason: impl Into<String>) -> Self {
        Self::Worker {
            frame_index,
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::EncoderSpawn { context, .. } => context,
            Self::EncoderExit { context, .. } => context,
            Self::Pipe { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Worker { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::EncoderSpawn { context, .. } => context,
            Self::EncoderExit { context, .. } => context,
            Self::Pipe { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Worker { context, .. } => context,
        }
    }

    /// Category name, stable across releases, for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Source { .. } => "source",
            Self::EncoderSpawn { .. } => "encoder_spawn",
            Self::EncoderExit { .. } => "encoder_exit",
            Self::Pipe { .. } => "pipe",
            Self::Timeout { .. } => "timeout",
            Self::Worker { .. } => "worker",
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { field, value, reason, .. } => {
                write!(f, "invalid configuration for '{field}' (value: {value}): {reason}")
            }
            Self::Source { reason, .. } => write!(f, "invalid source image: {reason}"),
            Self::EncoderSpawn { program, source, .. } => {
                write!(f, "failed to spawn encoder '{program}': {source}")
            }
            Self::EncoderExit { code, stderr_tail, .. } => {
                if stderr_tail.is_empty() {
                    write!(f, "encoder exited with code {code:?}")
                } else {
                    write!(f, "encoder exited with code {code:?}: {stderr_tail}")
                }
            }
            Self::Pipe { frames_written, source, .. } => {
                write!(f, "broken pipe after {frames_written} frames: {source}")
            }
            Self::Timeout { operation, elapsed_secs, .. } => {
                write!(f, "watchdog timed out during {operation} after {elapsed_secs}s")
            }
            Self::Worker { frame_index, reason, .. } => {
                write!(f, "worker failed on frame {frame_index}: {reason}")
            }
        }
    }
}

impl StdError for RenderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::EncoderSpawn { source, .. } => Some(source),
            Self::Pipe { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias used throughout the pipeline.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that may be worth retrying at the call site.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RenderError {
    fn is_retryable(&self) -> bool {
        self.context().retryable || matches!(self, Self::Pipe { .. })
    }
}

/// Errors the pipeline itself can recover from (e.g. GPU->CPU fallback).
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for RenderError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
    }
}

pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for RenderError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for RenderError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification helpers used by the CLI to pick an exit code.
pub mod classify {
    use super::*;

    pub fn is_transient(error: &RenderError) -> bool {
        matches!(error, RenderError::Pipe { .. } | RenderError::Timeout { .. })
    }

    pub fn is_fatal(error: &RenderError) -> bool {
        matches!(error, RenderError::Config { .. } | RenderError::Source { .. })
            || error.severity() == ErrorSeverity::Fatal
    }

    pub fn requires_user_intervention(error: &RenderError) -> bool {
        error.severity() >= ErrorSeverity::Critical
    }

    /// Maps a `RenderError` to a process exit code. Config/source errors get
    /// a distinct code from pipeline/runtime failures so scripts can branch
    /// on "fix your arguments" vs "try again".
    pub fn exit_code(error: &RenderError) -> i32 {
        match error {
            RenderError::Config { .. } | RenderError::Source { .. } => 2,
            RenderError::EncoderSpawn { .. } => 3,
            RenderError::EncoderExit { .. } => 4,
            RenderError::Pipe { .. } => 5,
            RenderError::Timeout { .. } => 6,
            RenderError::Worker { .. } => 7,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(error: std::io::Error) -> Self {
        Self::Pipe {
            frames_written: 0,
            source: error,
            context: ErrorContext::new().with_severity(ErrorSeverity::Critical),
        }
    }
}

impl From<image::ImageError> for RenderError {
    fn from(error: image::ImageError) -> Self {
        Self::source(error.to_string())
    }
}

impl From<std::num::ParseFloatError> for RenderError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::config("unknown", "unknown", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_fatal_not_retryable() {
        let error = RenderError::config("fps", "0", "must be > 0");
        assert_eq!(error.category(), "config");
        assert!(!error.is_retryable());
        assert!(classify::is_fatal(&error));
    }

    #[test]
    fn pipe_error_is_retryable_and_transient() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error = RenderError::pipe(42, io_err);
        assert!(error.is_retryable());
        assert!(classify::is_transient(&error));
        assert_eq!(classify::exit_code(&error), 5);
    }

    #[test]
    fn context_survives_builder_chain() {
        let error = RenderError::timeout("encoder_wait", 120)
            .with_context("post-stream drain")
            .with_recovery_suggestion("check encoder stderr");
        assert_eq!(
            error.recovery_suggestion(),
            Some("check encoder stderr")
        );
        assert_eq!(error.context().context.as_deref(), Some("post-stream drain"));
    }

    #[test]
    fn severity_ordering_drives_user_intervention() {
        let fatal = RenderError::config("v", "0.1", "must be >= 0.5");
        let transient = RenderError::pipe(1, std::io::Error::new(std::io::ErrorKind::BrokenPipe, "x"));
        assert!(classify::requires_user_intervention(&fatal));
        assert!(classify::requires_user_intervention(&transient));
    }
}
