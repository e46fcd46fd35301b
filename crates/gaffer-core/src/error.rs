//! Error types for Gaffer Core

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter error types
///
/// The wrapped engine owns manifest parsing, segment fetching, and DRM, so
/// its failures reach the adapter as opaque messages. Both load failures and
/// runtime engine error events terminate in the same host-facing error
/// signal; unload and destroy failures are logged and swallowed.
#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Engine load failed: {0}")]
    Load(String),

    #[error("Engine unload failed: {0}")]
    Unload(String),

    #[error("Engine destroy failed: {0}")]
    Destroy(String),

    // Runtime errors raised by the engine's error event
    #[error("Engine error: {0}")]
    Engine(String),
}

impl Error {
    /// Returns the error code attached to log records
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Load(_) => "ENGINE_LOAD",
            Error::Unload(_) => "ENGINE_UNLOAD",
            Error::Destroy(_) => "ENGINE_DESTROY",
            Error::Engine(_) => "ENGINE_RUNTIME",
        }
    }
}
