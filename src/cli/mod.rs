//! Command-line interface definitions for the `vscale-machine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `vscale-machine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vscale-machine",
    about = "Provision Docker hosts on Vscale scalets",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Directory holding machine records and SSH keys. Defaults to
    /// `~/.vscale-machine`.
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        env = "MACHINE_STORAGE_PATH"
    )]
    pub(crate) storage_path: Option<String>,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Machine lifecycle operations.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create a scalet and record it under the given name.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Power a machine on.
    #[command(name = "start")]
    Start(MachineArgs),
    /// Power a machine off.
    #[command(name = "stop")]
    Stop(MachineArgs),
    /// Reboot a machine.
    #[command(name = "restart")]
    Restart(MachineArgs),
    /// Stop a machine; the provider has no forced power-off.
    #[command(name = "kill")]
    Kill(MachineArgs),
    /// Delete the scalet, its SSH key, and the local record.
    #[command(name = "remove")]
    Remove(MachineArgs),
    /// Print the machine state.
    #[command(name = "state")]
    State(MachineArgs),
    /// Print the public IP address.
    #[command(name = "ip")]
    Ip(MachineArgs),
    /// Print the host name used for SSH.
    #[command(name = "ssh-hostname")]
    SshHostname(MachineArgs),
    /// Print the Docker daemon URL.
    #[command(name = "url")]
    Url(MachineArgs),
    /// List the driver flags with their environment variables and defaults.
    #[command(name = "flags")]
    Flags,
}

/// Selects an existing machine.
#[derive(Debug, Args)]
pub(crate) struct MachineArgs {
    /// Machine name.
    pub(crate) name: String,
}

/// Arguments for the `create` subcommand.
///
/// Omitted flags fall back to `VSCALE_*` environment variables, then to
/// `scalet.toml`, then to built-in defaults.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Machine name, also used for the scalet and its SSH key.
    pub(crate) name: String,
    /// Vscale API access token.
    #[arg(long = "vscale-access-token", value_name = "TOKEN")]
    pub(crate) access_token: Option<String>,
    /// Datacenter location.
    #[arg(long = "vscale-location", value_name = "LOCATION")]
    pub(crate) location: Option<String>,
    /// Base image identifier.
    #[arg(long = "vscale-made-from", value_name = "IMAGE")]
    pub(crate) made_from: Option<String>,
    /// Resource plan identifier.
    #[arg(long = "vscale-rplan", value_name = "RPLAN")]
    pub(crate) rplan: Option<String>,
    /// Swap file size in megabytes; 0 disables the swap file.
    #[arg(long = "vscale-swap-file", value_name = "MEGABYTES")]
    pub(crate) swap_file: Option<u32>,
}
