//! Error types for the Vscale driver.

use thiserror::Error;

use super::api::VscaleApiError;
use crate::ssh::SshError;
use crate::wait::WaitError;

/// Errors raised by the Vscale driver.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VscaleDriverError {
    /// Raised when a remote operation is attempted without a token.
    #[error("vscale driver requires the --vscale-access-token option")]
    MissingAccessToken,
    /// Raised when a flag value cannot be used.
    #[error("invalid value for --{flag}: {message}")]
    InvalidFlag {
        /// Flag name without leading dashes.
        flag: String,
        /// Why the value was rejected.
        message: String,
    },
    /// Raised when an operation needs a resource that was never created.
    #[error("machine {machine} has no {resource}; was it created?")]
    NotCreated {
        /// Machine name.
        machine: String,
        /// Missing resource (`scalet` or `ssh key`).
        resource: String,
    },
    /// Raised when the address is requested before the scalet is active.
    #[error("IP address is not set")]
    MissingIpAddress,
    /// Raised when a wait exceeds its budget.
    #[error("timed out waiting for {action}")]
    Timeout {
        /// Action being waited on.
        action: String,
    },
    /// Raised when a wait is interrupted by the caller.
    #[error("cancelled while waiting for {action}")]
    Cancelled {
        /// Action being waited on.
        action: String,
    },
    /// Wrapper for provider API failures.
    #[error("provider error: {0}")]
    Provider(#[from] VscaleApiError),
    /// Wrapper for key generation and SSH failures.
    #[error("ssh error: {0}")]
    Ssh(#[from] SshError),
    /// Raised when the worker running an external command panicked or was
    /// aborted.
    #[error("{program} worker stopped: {message}")]
    Worker {
        /// Command the worker was running.
        program: String,
        /// Join error message.
        message: String,
    },
}

impl<E> From<WaitError<E>> for VscaleDriverError
where
    E: Into<Self>,
{
    fn from(value: WaitError<E>) -> Self {
        match value {
            WaitError::Probe(err) => err.into(),
            WaitError::Timeout { action, .. } => Self::Timeout { action },
            WaitError::Cancelled { action } => Self::Cancelled { action },
        }
    }
}
