//! Vscale API surface used by the driver: wire models, errors, and the
//! client traits the driver is written against.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Future returned by API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, VscaleApiError>> + Send + 'a>>;

/// Errors raised by the Vscale API client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VscaleApiError {
    /// Raised when the client cannot be built for the configured endpoint.
    #[error("invalid API base URL {url}: {message}")]
    InvalidBaseUrl {
        /// Rejected base URL.
        url: String,
        /// Parser or builder message.
        message: String,
    },
    /// Raised when a request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("{message} (status {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the provider.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when an asynchronous provider task reports failure.
    #[error("task {task_id} ({method}) failed")]
    TaskFailed {
        /// Provider task identifier.
        task_id: String,
        /// Operation the task performed.
        method: String,
    },
    /// Raised when waiting for a provider task timed out or was cancelled.
    #[error("task {task_id} did not complete: {message}")]
    TaskWait {
        /// Provider task identifier.
        task_id: String,
        /// Why the wait stopped.
        message: String,
    },
}

/// SSH key registered with the account.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SshKey {
    /// Provider key identifier.
    pub id: i64,
    /// Public key material.
    #[serde(default)]
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Network address block of a scalet.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Address {
    /// IP address; empty until assigned.
    #[serde(default)]
    pub address: String,
    /// Netmask.
    #[serde(default)]
    pub netmask: String,
    /// Gateway.
    #[serde(default)]
    pub gateway: String,
}

/// Key reference embedded in a scalet.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScaletKey {
    /// Provider key identifier.
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Virtual server as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Scalet {
    /// Container identifier, used in every scalet path.
    pub ctid: i64,
    /// Scalet name.
    #[serde(default)]
    pub name: String,
    /// Provider status (`defined`, `started`, `stopped`, ...).
    #[serde(default)]
    pub status: String,
    /// Datacenter location.
    #[serde(default)]
    pub location: String,
    /// Resource plan.
    #[serde(default)]
    pub rplan: String,
    /// Base image.
    #[serde(default)]
    pub made_from: String,
    /// Host name assigned by the provider.
    #[serde(default)]
    pub hostname: String,
    /// Whether an operation currently holds the scalet.
    #[serde(default)]
    pub locked: bool,
    /// Whether the scalet finished provisioning.
    #[serde(default)]
    pub active: bool,
    /// SSH keys installed on the scalet.
    #[serde(default)]
    pub keys: Vec<ScaletKey>,
    /// Public network address.
    #[serde(default)]
    pub public_address: Option<Address>,
    /// Private network address.
    #[serde(default)]
    pub private_address: Option<Address>,
}

impl Scalet {
    /// Returns the public IP address once one has been assigned.
    #[must_use]
    pub fn public_ip(&self) -> Option<&str> {
        self.public_address
            .as_ref()
            .map(|address| address.address.as_str())
            .filter(|address| !address.is_empty())
    }
}

/// Body of a scalet creation request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateScaletRequest {
    /// Base image identifier.
    pub make_from: String,
    /// Resource plan identifier.
    pub rplan: String,
    /// Whether to boot the scalet once created.
    pub do_start: bool,
    /// Scalet name.
    pub name: String,
    /// SSH key identifiers to install.
    pub keys: Vec<i64>,
    /// Datacenter location.
    pub location: String,
}

/// Asynchronous provider task.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Whether the task finished.
    #[serde(default)]
    pub done: bool,
    /// Whether the task failed; absent while running.
    #[serde(default)]
    pub error: Option<bool>,
    /// Operation performed by the task.
    #[serde(default)]
    pub method: String,
    /// Scalet the task operates on.
    #[serde(default)]
    pub scalet: Option<i64>,
}

/// Operations the driver needs from the provider.
///
/// Power operations and removal wait for the provider task to finish before
/// resolving.
pub trait ScaletApi {
    /// Registers a public key under `name`.
    fn create_ssh_key<'a>(&'a self, key: &'a str, name: &'a str) -> ApiFuture<'a, SshKey>;

    /// Deletes a registered key.
    fn remove_ssh_key(&self, id: i64) -> ApiFuture<'_, ()>;

    /// Creates a scalet.
    fn create_scalet<'a>(&'a self, request: &'a CreateScaletRequest) -> ApiFuture<'a, Scalet>;

    /// Fetches a scalet.
    fn get_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet>;

    /// Powers a scalet on.
    fn start_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet>;

    /// Powers a scalet off.
    fn stop_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet>;

    /// Reboots a scalet.
    fn restart_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet>;

    /// Deletes a scalet.
    fn remove_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet>;
}

/// Builds an authenticated API client for an access token.
pub trait ApiConnector {
    /// Client produced by this connector.
    type Api: ScaletApi + Send + Sync;

    /// Builds a client for `access_token`; task waits stop when `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns [`VscaleApiError::InvalidBaseUrl`] when the client cannot be
    /// constructed.
    fn connect(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Self::Api, VscaleApiError>;
}
