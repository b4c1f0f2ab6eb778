//! SSH key generation and remote command execution via the system tools.
//!
//! The driver never speaks the SSH protocol itself: keys come from
//! `ssh-keygen` and sessions from the `ssh` client, both invoked through a
//! [`CommandRunner`] so tests can script their outcomes.

use std::ffi::OsString;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};

mod runner;
mod swap;

pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use swap::{SWAP_FILE_PATH, swap_file_script};

/// Default `ssh` executable.
pub const DEFAULT_SSH_BIN: &str = "ssh";

/// Default `ssh-keygen` executable.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

const KEY_BITS: &str = "2048";
const CONNECT_TIMEOUT_SECS: &str = "10";

/// Errors raised by key generation and remote execution.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when key material cannot be read or its directory created.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Address and credentials of an SSH endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshTarget {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Remote user.
    pub user: String,
    /// Private key used for authentication.
    pub key_path: Utf8PathBuf,
}

/// Runs `ssh-keygen` and `ssh` through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct SshClient<R: CommandRunner> {
    runner: R,
    ssh_bin: String,
    keygen_bin: String,
}

impl SshClient<ProcessCommandRunner> {
    /// Client backed by the host's process runner and default binaries.
    #[must_use]
    pub fn with_process_runner() -> Self {
        Self::new(ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshClient<R> {
    /// Creates a client using the default binaries.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            ssh_bin: DEFAULT_SSH_BIN.to_owned(),
            keygen_bin: DEFAULT_SSH_KEYGEN_BIN.to_owned(),
        }
    }

    /// Overrides the `ssh` executable.
    #[must_use]
    pub fn with_ssh_bin(mut self, ssh_bin: impl Into<String>) -> Self {
        self.ssh_bin = ssh_bin.into();
        self
    }

    /// Overrides the `ssh-keygen` executable.
    #[must_use]
    pub fn with_keygen_bin(mut self, keygen_bin: impl Into<String>) -> Self {
        self.keygen_bin = keygen_bin.into();
        self
    }

    /// Generates an RSA key pair at `path` unless a private key is
    /// already present there.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Io`] when the key directory cannot be prepared and
    /// [`SshError::CommandFailure`] when `ssh-keygen` fails.
    pub fn generate_key(&self, path: &Utf8Path) -> Result<(), SshError> {
        let (dir, file_name) = open_parent(path, true)?;
        let exists = dir.try_exists(file_name).map_err(|err| io_error(path, &err))?;
        if exists {
            debug!(%path, "reusing existing SSH key");
            return Ok(());
        }

        let args = vec![
            OsString::from("-q"),
            OsString::from("-t"),
            OsString::from("rsa"),
            OsString::from("-b"),
            OsString::from(KEY_BITS),
            OsString::from("-N"),
            OsString::new(),
            OsString::from("-f"),
            OsString::from(path.as_str()),
        ];
        let output = self.runner.run(&self.keygen_bin, &args)?;
        Self::ensure_success(&self.keygen_bin, &output)?;
        info!(%path, "generated SSH key");
        Ok(())
    }

    /// Reads the public half of the key pair at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Io`] when `<path>.pub` cannot be read.
    pub fn read_public_key(&self, path: &Utf8Path) -> Result<String, SshError> {
        let public_path = public_key_path(path);
        let (dir, file_name) = open_parent(&public_path, false)?;
        dir.read_to_string(file_name)
            .map_err(|err| io_error(&public_path, &err))
    }

    /// Checks whether `target` accepts an SSH session.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Spawn`] when the `ssh` client cannot be started.
    /// An unreachable host is reported as `Ok(false)`.
    pub fn is_reachable(&self, target: &SshTarget) -> Result<bool, SshError> {
        let output = self.execute(target, "exit 0")?;
        debug!(host = %target.host, status = %output.status_text(), "ssh probe");
        Ok(output.is_success())
    }

    /// Runs `command` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Spawn`] when `ssh` cannot be started and
    /// [`SshError::CommandFailure`] when the remote command exits non-zero.
    pub fn run(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        let output = self.execute(target, command)?;
        Self::ensure_success(&self.ssh_bin, &output)?;
        Ok(output)
    }

    fn execute(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        let args = Self::build_ssh_args(target, command);
        self.runner.run(&self.ssh_bin, &args)
    }

    fn ensure_success(program: &str, output: &CommandOutput) -> Result<(), SshError> {
        if output.is_success() {
            return Ok(());
        }
        Err(SshError::CommandFailure {
            program: program.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.clone(),
        })
    }

    fn build_ssh_args(target: &SshTarget, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(target.port.to_string()),
            OsString::from("-i"),
            OsString::from(target.key_path.as_str()),
        ];
        for option in [
            "BatchMode=yes",
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "LogLevel=quiet",
        ] {
            args.push(OsString::from("-o"));
            args.push(OsString::from(option));
        }
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={CONNECT_TIMEOUT_SECS}"
        )));
        args.push(OsString::from(format!("{}@{}", target.user, target.host)));
        args.push(OsString::from(command));
        args
    }
}

/// Returns the public key path matching the private key at `path`.
#[must_use]
pub fn public_key_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}.pub"))
}

fn open_parent<'p>(path: &'p Utf8Path, create: bool) -> Result<(Dir, &'p str), SshError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| SshError::Io {
        path: path.to_path_buf(),
        message: String::from("key path is missing a file name"),
    })?;

    if create {
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| io_error(parent, &err))?;
    }
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(parent, &err))?;
    Ok((dir, file_name))
}

fn io_error(path: &Utf8Path, err: &io::Error) -> SshError {
    SshError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests;
