//! Vscale implementation of the machine driver.

mod api;
mod client;
mod error;
mod lifecycle;
mod options;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::driver::{Driver, DriverFuture, MachineState};
use crate::flags::{DriverOptions, McnFlag};
use crate::ssh::{CommandRunner, ProcessCommandRunner, SshClient, SshTarget};
use crate::store::machine_dir;
use crate::wait::WaitPolicy;

pub use api::{
    Address, ApiConnector, ApiFuture, CreateScaletRequest, Scalet, ScaletApi, ScaletKey, SshKey,
    Task, VscaleApiError,
};
pub use client::{API_URL_ENV, DEFAULT_API_URL, HttpConnector, TASK_WAIT, VscaleClient};
pub use error::VscaleDriverError;
pub use options::{
    DEFAULT_LOCATION, DEFAULT_MADE_FROM, DEFAULT_RPLAN, DEFAULT_SWAP_FILE, FLAG_ACCESS_TOKEN,
    FLAG_LOCATION, FLAG_MADE_FROM, FLAG_RPLAN, FLAG_SWAP_FILE, create_flags,
};

/// Name under which the driver registers with the host.
pub const DRIVER_NAME: &str = "vscale";

/// Port of the Docker daemon on provisioned machines.
pub const DOCKER_PORT: u16 = 2376;

/// Pacing of the activation poll after a scalet is created.
pub const ACTIVATION_WAIT: WaitPolicy =
    WaitPolicy::new(Duration::from_secs(1), Duration::from_secs(600));

/// Pacing of the SSH readiness probe before swap provisioning.
pub const SSH_WAIT: WaitPolicy = WaitPolicy::new(Duration::from_secs(3), Duration::from_secs(600));

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_PORT: u16 = 22;
const SSH_KEY_FILE: &str = "id_rsa";

const fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_owned()
}

/// Everything the driver knows about one machine.
///
/// Identity and provisioning parameters are fixed once configured; the
/// runtime identifiers are filled in by [`Driver::create`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineRecord {
    /// Machine name, also used for the scalet and its SSH key.
    pub machine_name: String,
    /// Storage root shared by all machines.
    pub store_path: Utf8PathBuf,
    /// Explicit private key location; derived from the store when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<Utf8PathBuf>,
    /// SSH login user.
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// API access token.
    #[serde(default)]
    pub access_token: String,
    /// Datacenter location.
    pub location: String,
    /// Base image identifier.
    pub made_from: String,
    /// Resource plan identifier.
    pub rplan: String,
    /// Swap file size in megabytes; zero disables it.
    #[serde(default)]
    pub swap_file: u32,
    /// Scalet identifier, set once the provider accepted the creation.
    #[serde(default)]
    pub scalet_id: Option<i64>,
    /// Identifier of the registered SSH key.
    #[serde(default)]
    pub ssh_key_id: Option<i64>,
    /// Public IP address, set once the scalet is active.
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl MachineRecord {
    /// Fresh record carrying the default provisioning parameters.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            ssh_key_path: None,
            ssh_user: default_ssh_user(),
            ssh_port: DEFAULT_SSH_PORT,
            access_token: String::new(),
            location: DEFAULT_LOCATION.to_owned(),
            made_from: DEFAULT_MADE_FROM.to_owned(),
            rplan: DEFAULT_RPLAN.to_owned(),
            swap_file: DEFAULT_SWAP_FILE,
            scalet_id: None,
            ssh_key_id: None,
            ip_address: None,
        }
    }

    /// Private key path: the explicit override or `id_rsa` in the machine
    /// directory.
    #[must_use]
    pub fn resolved_ssh_key_path(&self) -> Utf8PathBuf {
        self.ssh_key_path.clone().unwrap_or_else(|| {
            machine_dir(&self.store_path, &self.machine_name).join(SSH_KEY_FILE)
        })
    }
}

/// Driver provisioning a single scalet.
///
/// The connector builds authenticated API clients on demand and the SSH
/// client runs `ssh-keygen` and `ssh`; both are injectable for tests.
#[derive(Clone, Debug)]
pub struct VscaleDriver<C = HttpConnector, R = ProcessCommandRunner>
where
    R: CommandRunner,
{
    record: MachineRecord,
    connector: C,
    ssh: SshClient<R>,
    activation_wait: WaitPolicy,
    ssh_wait: WaitPolicy,
    cancel: CancellationToken,
}

impl VscaleDriver {
    /// Driver for a new machine talking to the configured API endpoint.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self::from_record(MachineRecord::new(machine_name, store_path))
    }

    /// Driver resuming a previously stored machine.
    #[must_use]
    pub fn from_record(record: MachineRecord) -> Self {
        Self::with_parts(
            record,
            HttpConnector::from_env(),
            SshClient::with_process_runner(),
        )
    }
}

impl<C, R> VscaleDriver<C, R>
where
    C: ApiConnector + Send + Sync,
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Driver built from explicit collaborators.
    #[must_use]
    pub fn with_parts(record: MachineRecord, connector: C, ssh: SshClient<R>) -> Self {
        Self {
            record,
            connector,
            ssh,
            activation_wait: ACTIVATION_WAIT,
            ssh_wait: SSH_WAIT,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the activation poll pacing.
    #[must_use]
    pub const fn with_activation_wait(mut self, policy: WaitPolicy) -> Self {
        self.activation_wait = policy;
        self
    }

    /// Overrides the SSH readiness poll pacing.
    #[must_use]
    pub const fn with_ssh_wait(mut self, policy: WaitPolicy) -> Self {
        self.ssh_wait = policy;
        self
    }

    /// Aborts every wait, including provider task waits, once `cancel`
    /// fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current machine record.
    #[must_use]
    pub const fn record(&self) -> &MachineRecord {
        &self.record
    }

    /// Consumes the driver, returning its record for persistence.
    #[must_use]
    pub fn into_record(self) -> MachineRecord {
        self.record
    }

    fn client(&self) -> Result<C::Api, VscaleDriverError> {
        if self.record.access_token.trim().is_empty() {
            return Err(VscaleDriverError::MissingAccessToken);
        }
        Ok(self
            .connector
            .connect(&self.record.access_token, &self.cancel)?)
    }

    fn not_created(&self, resource: &str) -> VscaleDriverError {
        VscaleDriverError::NotCreated {
            machine: self.record.machine_name.clone(),
            resource: resource.to_owned(),
        }
    }

    fn scalet_id(&self) -> Result<i64, VscaleDriverError> {
        self.record
            .scalet_id
            .ok_or_else(|| self.not_created("scalet"))
    }

    fn ip_address(&self) -> Result<&str, VscaleDriverError> {
        self.record
            .ip_address
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .ok_or(VscaleDriverError::MissingIpAddress)
    }

    fn ssh_target(&self) -> Result<SshTarget, VscaleDriverError> {
        Ok(SshTarget {
            host: self.ip_address()?.to_owned(),
            port: self.record.ssh_port,
            user: self.record.ssh_user.clone(),
            key_path: self.record.resolved_ssh_key_path(),
        })
    }
}

/// Maps a provider status onto the host's machine state.
#[must_use]
pub fn state_from_status(status: &str) -> MachineState {
    match status {
        "defined" => MachineState::Starting,
        "started" => MachineState::Running,
        "stopped" => MachineState::Stopped,
        _ => MachineState::None,
    }
}

/// Formats the Docker endpoint for `host`, bracketing IPv6 addresses.
#[must_use]
pub fn docker_url(host: &str) -> String {
    host.parse::<IpAddr>().map_or_else(
        |_| format!("tcp://{host}:{DOCKER_PORT}"),
        |ip| format!("tcp://{}", SocketAddr::new(ip, DOCKER_PORT)),
    )
}

fn swap_size(value: i64) -> Result<u32, VscaleDriverError> {
    u32::try_from(value).map_err(|_| VscaleDriverError::InvalidFlag {
        flag: FLAG_SWAP_FILE.to_owned(),
        message: format!("{value} is not a swap size in megabytes between 0 and {}", u32::MAX),
    })
}

impl<C, R> Driver for VscaleDriver<C, R>
where
    C: ApiConnector + Send + Sync,
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    type Error = VscaleDriverError;

    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn create_flags(&self) -> Vec<McnFlag> {
        create_flags()
    }

    fn set_config_from_flags(&mut self, options: &dyn DriverOptions) -> Result<(), Self::Error> {
        let access_token = options.string(FLAG_ACCESS_TOKEN);
        if access_token.trim().is_empty() {
            return Err(VscaleDriverError::MissingAccessToken);
        }
        let swap_file = swap_size(options.int(FLAG_SWAP_FILE))?;

        self.record.access_token = access_token;
        self.record.location = options.string(FLAG_LOCATION);
        self.record.made_from = options.string(FLAG_MADE_FROM);
        self.record.rplan = options.string(FLAG_RPLAN);
        self.record.swap_file = swap_file;
        Ok(())
    }

    fn pre_create_check(&self) -> Result<(), Self::Error> {
        self.client().map(|_| ())
    }

    fn create(&mut self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            self.create_ssh_key(&api).await?;
            self.create_scalet(&api).await?;
            self.create_swap_file().await
        })
    }

    fn start(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            let ctid = self.scalet_id()?;
            api.start_scalet(ctid).await?;
            info!(machine = %self.record.machine_name, ctid, "scalet started");
            Ok(())
        })
    }

    fn stop(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            let ctid = self.scalet_id()?;
            api.stop_scalet(ctid).await?;
            info!(machine = %self.record.machine_name, ctid, "scalet stopped");
            Ok(())
        })
    }

    fn restart(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            let ctid = self.scalet_id()?;
            api.restart_scalet(ctid).await?;
            info!(machine = %self.record.machine_name, ctid, "scalet restarted");
            Ok(())
        })
    }

    // The provider has no forced power-off.
    fn kill(&self) -> DriverFuture<'_, (), Self::Error> {
        self.stop()
    }

    fn remove(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            self.remove_resources(&api).await
        })
    }

    fn get_state(&self) -> DriverFuture<'_, MachineState, Self::Error> {
        Box::pin(async move {
            let api = self.client()?;
            let scalet = api.get_scalet(self.scalet_id()?).await?;
            Ok(state_from_status(&scalet.status))
        })
    }

    fn get_ip(&self) -> Result<String, Self::Error> {
        self.ip_address().map(str::to_owned)
    }

    fn get_ssh_hostname(&self) -> Result<String, Self::Error> {
        self.get_ip()
    }

    fn get_url(&self) -> Result<String, Self::Error> {
        self.ip_address().map(docker_url)
    }

    fn machine_name(&self) -> &str {
        &self.record.machine_name
    }

    fn ssh_username(&self) -> &str {
        &self.record.ssh_user
    }

    fn ssh_port(&self) -> u16 {
        self.record.ssh_port
    }

    fn ssh_key_path(&self) -> Utf8PathBuf {
        self.record.resolved_ssh_key_path()
    }
}
