//! Error types and `error-stack` integration for the fleetctl CLI.
//!
//! [`CliError`] is the single canonical error context. All commands
//! return [`CliResult<T>`], an alias for `error_stack::Result<T, CliError>`.
//! Because `From<CliError>` is implemented for `error_stack::Report<CliError>`,
//! the plain `?` operator works unchanged wherever a function already
//! returns `CliResult`.

use error_stack::Report;
use fleetctl_core::FleetError;

/// Unified error context for every fleetctl command.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CliError {
    /// A problem loading, parsing, or validating `llms.yaml` or secrets.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A failure from the core allocator/lifecycle/client engine.
    #[error("{0}")]
    Fleet(#[from] FleetError),

    /// A problem reading or writing the instance registry file.
    #[error("State error: {0}")]
    StateError(String),

    /// An operating-system I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization / deserialization failure.
    #[error("JSON error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A failure during context initialization.
    #[error("Initialization error: {0}")]
    InitError(String),

    /// A catch-all for errors that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

/// The canonical result type for every fleetctl command.
pub type CliResult<T> = ::std::result::Result<T, error_stack::Report<CliError>>;

/// Extension trait to convert a `Result<T, CliError>` into a [`CliResult<T>`].
pub trait IntoCliReport<T> {
    fn into_report(self) -> CliResult<T>;
}

impl<T> IntoCliReport<T> for std::result::Result<T, CliError> {
    #[inline]
    fn into_report(self) -> CliResult<T> {
        self.map_err(Report::new)
    }
}

/// Install the global `error_stack` debug hooks for production-quality
/// CLI output. Call once at the start of `main()`.
pub fn install_hook() {
    Report::install_debug_hook::<std::panic::Location>(|location, ctx| {
        if std::env::var("RUST_BACKTRACE").is_ok() || cfg!(debug_assertions) {
            ctx.push_body(format!(
                "at {}:{}:{}",
                location.file(),
                location.line(),
                location.column(),
            ));
        }
    });
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::Other(s.to_string())
    }
}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::Other(s)
    }
}
