//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::ssh::{CommandOutput, CommandRunner, SshError};
use crate::vscale::{
    Address, ApiConnector, ApiFuture, CreateScaletRequest, Scalet, ScaletApi, SshKey,
    VscaleApiError,
};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic `ssh` and `ssh-keygen` outcomes without
/// spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SshError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| SshError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Provider call recorded by [`ScriptedApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// `POST /sshkeys`.
    CreateSshKey {
        /// Public key material.
        key: String,
        /// Key name.
        name: String,
    },
    /// `DELETE /sshkeys/{id}`.
    RemoveSshKey(i64),
    /// `POST /scalets`.
    CreateScalet(CreateScaletRequest),
    /// `GET /scalets/{ctid}`.
    GetScalet(i64),
    /// `PATCH /scalets/{ctid}/start`.
    StartScalet(i64),
    /// `PATCH /scalets/{ctid}/stop`.
    StopScalet(i64),
    /// `PATCH /scalets/{ctid}/restart`.
    RestartScalet(i64),
    /// `DELETE /scalets/{ctid}`.
    RemoveScalet(i64),
}

#[derive(Debug, Default)]
struct ApiScript {
    keys: VecDeque<Result<SshKey, VscaleApiError>>,
    key_removals: VecDeque<Result<(), VscaleApiError>>,
    scalets: VecDeque<Result<Scalet, VscaleApiError>>,
    calls: Vec<ApiCall>,
}

/// Scripted provider API returning queued responses in FIFO order.
///
/// Key creation, key removal, and every scalet-returning operation draw
/// from separate queues. Clones share the same script and call log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    script: Arc<StdMutex<ApiScript>>,
}

fn unscripted(operation: &str) -> VscaleApiError {
    VscaleApiError::Transport {
        url: format!("scripted://{operation}"),
        message: String::from("no scripted response available"),
    }
}

impl ScriptedApi {
    /// Creates an API with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next key registration.
    pub fn push_key(&self, result: Result<SshKey, VscaleApiError>) {
        lock(&self.script).keys.push_back(result);
    }

    /// Queues the result of the next key removal.
    pub fn push_key_removal(&self, result: Result<(), VscaleApiError>) {
        lock(&self.script).key_removals.push_back(result);
    }

    /// Queues the result of the next scalet operation.
    pub fn push_scalet(&self, result: Result<Scalet, VscaleApiError>) {
        lock(&self.script).scalets.push_back(result);
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.script).calls.clone()
    }

    fn next_scalet(&self, call: ApiCall) -> Result<Scalet, VscaleApiError> {
        let mut script = lock(&self.script);
        script.calls.push(call);
        script
            .scalets
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("scalet")))
    }
}

impl ScaletApi for ScriptedApi {
    fn create_ssh_key<'a>(&'a self, key: &'a str, name: &'a str) -> ApiFuture<'a, SshKey> {
        Box::pin(async move {
            let mut script = lock(&self.script);
            script.calls.push(ApiCall::CreateSshKey {
                key: key.to_owned(),
                name: name.to_owned(),
            });
            script
                .keys
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("sshkeys")))
        })
    }

    fn remove_ssh_key(&self, id: i64) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let mut script = lock(&self.script);
            script.calls.push(ApiCall::RemoveSshKey(id));
            script
                .key_removals
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("sshkeys")))
        })
    }

    fn create_scalet<'a>(&'a self, request: &'a CreateScaletRequest) -> ApiFuture<'a, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::CreateScalet(request.clone())) })
    }

    fn get_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::GetScalet(ctid)) })
    }

    fn start_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::StartScalet(ctid)) })
    }

    fn stop_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::StopScalet(ctid)) })
    }

    fn restart_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::RestartScalet(ctid)) })
    }

    fn remove_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.next_scalet(ApiCall::RemoveScalet(ctid)) })
    }
}

/// Connector handing out clones of a shared [`ScriptedApi`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    api: ScriptedApi,
    tokens: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedConnector {
    /// Connector serving `api`.
    #[must_use]
    pub fn new(api: ScriptedApi) -> Self {
        Self {
            api,
            tokens: Arc::default(),
        }
    }

    /// Tokens passed to [`ApiConnector::connect`], in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }
}

impl ApiConnector for ScriptedConnector {
    type Api = ScriptedApi;

    fn connect(
        &self,
        access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<Self::Api, VscaleApiError> {
        lock(&self.tokens).push(access_token.to_owned());
        Ok(self.api.clone())
    }
}

/// Builds a scalet payload with the given status and public address.
///
/// The scalet is reported active exactly when an address is supplied.
#[must_use]
pub fn scalet(ctid: i64, status: &str, public_ip: Option<&str>) -> Scalet {
    Scalet {
        ctid,
        name: String::from("test-machine"),
        status: status.to_owned(),
        active: public_ip.is_some(),
        public_address: Some(Address {
            address: public_ip.unwrap_or_default().to_owned(),
            ..Address::default()
        }),
        ..Scalet::default()
    }
}

/// Builds a registered key payload.
#[must_use]
pub fn ssh_key(id: i64, name: &str) -> SshKey {
    SshKey {
        id,
        key: String::from("ssh-rsa AAAA test"),
        name: name.to_owned(),
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
