//! Error types for the runner
//!
//! Every failure is surfaced to the immediate caller; nothing here is
//! retried or translated on the way up.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring or driving a guest module
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A required capability is missing from the bindings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// `compile` received a byte source it cannot work with
    #[error("Invalid module source: {0}")]
    InvalidInput(String),

    /// Downloading the module body failed
    #[error("Failed to fetch module: {source}")]
    Fetch {
        #[source]
        source: reqwest::Error,
    },

    /// Byte-to-module compilation failed
    #[error("Module compilation failed: {0}")]
    Compile(#[source] anyhow::Error),

    /// Module-to-instance wiring failed
    #[error("Instantiation failed: {0}")]
    Instantiate(#[source] anyhow::Error),

    /// A preopened directory could not be granted to the guest
    #[error("Failed to preopen directory '{path}': {source}")]
    Preopen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The module does not export the expected entry point
    #[error("Entry point not found: {0}")]
    EntryPointNotFound(String),

    /// No cryptographically secure randomness source is reachable
    #[error("No secure randomness source available (insecure fallback not enabled)")]
    NoSecureRandomness,

    /// The guest requested process exit but no process control is available
    #[error("Guest exited with code {0}")]
    GuestExit(i32),

    /// The guest raised a signal but no process control is available
    #[error("Guest raised signal {0}")]
    GuestKill(i32),

    /// A runtime trap inside the started instance
    #[error("Guest fault: {0}")]
    Fault(#[source] anyhow::Error),
}

impl RunnerError {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// The exit code the guest asked for, if this error carries one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::GuestExit(code) => Some(*code),
            _ => None,
        }
    }

    /// Check if this error represents an intentional guest-side signal
    /// rather than a host-side failure
    pub fn is_guest_signal(&self) -> bool {
        matches!(self, Self::GuestExit(_) | Self::GuestKill(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_extraction() {
        assert_eq!(RunnerError::GuestExit(2).exit_code(), Some(2));
        assert_eq!(RunnerError::GuestKill(9).exit_code(), None);
        assert_eq!(RunnerError::configuration("x").exit_code(), None);
    }

    #[test]
    fn test_guest_signal_classification() {
        assert!(RunnerError::GuestExit(0).is_guest_signal());
        assert!(RunnerError::GuestKill(15).is_guest_signal());
        assert!(!RunnerError::invalid_input("bad").is_guest_signal());
    }
}
