// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all backend failures.
///
/// Arithmetic never fails; every variant here belongs to configuration
/// or to the load-time handshake with the host.
#[derive(Error, Debug)]
pub enum CancellationError {
    /// Invalid configuration value. The previous value stays in effect.
    #[error("config error: {0}")]
    Config(String),

    /// Command line could not be parsed as backend options.
    #[error("command line error: {0}")]
    Cli(String),

    /// The host does not provide a service the backend needs. Fatal.
    #[error("Interflop backend error: {service} not implemented")]
    MissingHostService { service: &'static str },

    /// Structured configuration could not be decoded.
    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CancellationResult<T> = Result<T, CancellationError>;
