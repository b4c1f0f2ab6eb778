//! Core library for the `vscale-machine` provisioning tool.
//!
//! The crate exposes the machine driver interface expected by a Docker host
//! manager and a Vscale implementation of it: register an SSH key, create a
//! scalet, wait until it is active, and optionally provision a swap file
//! over SSH. Machine records persist on disk between invocations.

pub mod config;
pub mod driver;
pub mod flags;
pub mod ssh;
pub mod store;
pub mod test_support;
pub mod vscale;
pub mod wait;

pub use config::{ConfigError, VscaleConfig};
pub use driver::{Driver, DriverFuture, MachineState, resolve_state};
pub use flags::{DriverOptions, FlagKind, FlagValues, McnFlag};
pub use ssh::{CommandOutput, CommandRunner, ProcessCommandRunner, SshClient, SshError, SshTarget};
pub use store::{MachineStore, StoreError};
pub use vscale::{
    HttpConnector, MachineRecord, VscaleApiError, VscaleClient, VscaleDriver, VscaleDriverError,
};
pub use wait::{Poll, WaitError, WaitPolicy, poll_until};
