//! Lifecycle interface implemented by machine drivers.
//!
//! The host management tool drives every provider through the same fixed
//! set of operations. A driver owns exactly one remote server for its whole
//! lifetime and mirrors its state from the provider without caching.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;

use crate::flags::{DriverOptions, McnFlag};

/// Future returned by asynchronous driver operations.
pub type DriverFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Coarse machine state reported to the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// The provider reported a status the driver does not recognise.
    None,
    /// The server is provisioned but not yet running.
    Starting,
    /// The server is running.
    Running,
    /// The server is stopped.
    Stopped,
    /// The state could not be determined.
    Error,
}

impl MachineState {
    /// Returns the label used by the host when printing the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a state lookup into the reported state and the error, if any.
///
/// A failed lookup is reported as [`MachineState::Error`] with the
/// underlying error preserved for the caller to surface.
#[must_use]
pub fn resolve_state<E>(result: Result<MachineState, E>) -> (MachineState, Option<E>) {
    match result {
        Ok(state) => (state, None),
        Err(err) => (MachineState::Error, Some(err)),
    }
}

/// Server lifecycle interface expected by the host.
pub trait Driver {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short provider name, used to select the driver.
    fn driver_name(&self) -> &'static str;

    /// Flags understood by [`Driver::set_config_from_flags`].
    fn create_flags(&self) -> Vec<McnFlag>;

    /// Reads provider options from the host's resolved flag values.
    ///
    /// # Errors
    ///
    /// Returns an error when a required option is missing or invalid.
    fn set_config_from_flags(&mut self, options: &dyn DriverOptions) -> Result<(), Self::Error>;

    /// Checks that creation can proceed before any resource is allocated.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider client cannot be built.
    fn pre_create_check(&self) -> Result<(), Self::Error>;

    /// Provisions the server and waits until it is reachable.
    fn create(&mut self) -> DriverFuture<'_, (), Self::Error>;

    /// Powers the server on.
    fn start(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Powers the server off.
    fn stop(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Reboots the server.
    fn restart(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Stops the server as forcefully as the provider allows.
    fn kill(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Deletes every provider resource owned by this machine.
    fn remove(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Fetches the current state from the provider.
    fn get_state(&self) -> DriverFuture<'_, MachineState, Self::Error>;

    /// Returns the public IP address assigned during creation.
    ///
    /// # Errors
    ///
    /// Returns an error when no address has been recorded yet.
    fn get_ip(&self) -> Result<String, Self::Error>;

    /// Returns the host name used for SSH connections.
    ///
    /// # Errors
    ///
    /// Returns an error when no address has been recorded yet.
    fn get_ssh_hostname(&self) -> Result<String, Self::Error>;

    /// Returns the Docker daemon endpoint of the machine.
    ///
    /// # Errors
    ///
    /// Returns an error when no address has been recorded yet.
    fn get_url(&self) -> Result<String, Self::Error>;

    /// Name of the machine managed by this driver.
    fn machine_name(&self) -> &str;

    /// User name for SSH sessions.
    fn ssh_username(&self) -> &str;

    /// TCP port for SSH sessions.
    fn ssh_port(&self) -> u16;

    /// Private key used for SSH sessions.
    fn ssh_key_path(&self) -> Utf8PathBuf;
}
