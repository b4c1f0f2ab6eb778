//! Shared fixtures for lifecycle BDD scenarios.
//!
//! The context only carries plain scenario data. Scripted collaborators are
//! assembled from it when a `when` step runs, and what they observed is
//! copied back as call logs.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;
use vscale_machine::test_support::{
    ApiCall, CommandInvocation, ScriptedApi, ScriptedConnector, ScriptedRunner, scalet, ssh_key,
};
use vscale_machine::vscale::{FLAG_ACCESS_TOKEN, FLAG_SWAP_FILE, create_flags};
use vscale_machine::{
    FlagValues, MachineRecord, SshClient, VscaleApiError, VscaleDriver, WaitPolicy,
};

use crate::test_constants::{MACHINE_NAME, PUBLIC_IP, SCALET_ID, SSH_KEY_ID};

const FAST_WAIT: WaitPolicy = WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(500));
const PUBLIC_KEY: &str = "ssh-rsa AAAAB3Nza docker-1";

pub type LifecycleContextResult = Result<LifecycleContext, LifecycleTestError>;
pub type ScriptedDriver = VscaleDriver<ScriptedConnector, ScriptedRunner>;

/// How the provider answers a key removal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyRemoval {
    Accepted,
    Rejected,
}

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub access_token: String,
    pub swap_file: i64,
    pub scalet_activates: bool,
    pub ssh_ready: bool,
    pub swap_exit_code: Option<i32>,
    pub key_removal: Option<KeyRemoval>,
    pub scalet_removal: bool,
    pub record: MachineRecord,
    pub root: Utf8PathBuf,
    pub api_calls: Vec<ApiCall>,
    pub commands: Vec<CommandInvocation>,
    pub outcome: Option<LifecycleResult>,
    pub(crate) store_tmp: Arc<TempDir>,
}

#[derive(Clone, Debug)]
pub enum LifecycleResult {
    Success,
    Failure(String),
}

#[derive(Clone, Debug, Error)]
pub enum LifecycleTestError {
    #[error("failed to create store: {0}")]
    Store(String),
}

/// Scripted provider and SSH runner prepared for one `when` step.
pub struct ScriptedWorld {
    pub api: ScriptedApi,
    pub runner: ScriptedRunner,
    connector: ScriptedConnector,
}

impl LifecycleContext {
    /// Queues the provider and SSH responses the scenario asked for.
    pub fn script(&self) -> ScriptedWorld {
        let api = ScriptedApi::new();
        api.push_key(Ok(ssh_key(SSH_KEY_ID, MACHINE_NAME)));
        if self.scalet_activates {
            api.push_scalet(Ok(scalet(SCALET_ID, "defined", None)));
            api.push_scalet(Ok(scalet(SCALET_ID, "started", Some(PUBLIC_IP))));
        }
        match self.key_removal {
            Some(KeyRemoval::Accepted) => api.push_key_removal(Ok(())),
            Some(KeyRemoval::Rejected) => api.push_key_removal(Err(VscaleApiError::Api {
                status: 400,
                message: String::from("key in use"),
            })),
            None => {}
        }
        if self.scalet_removal {
            api.push_scalet(Ok(scalet(SCALET_ID, "deleted", Some(PUBLIC_IP))));
        }

        let runner = ScriptedRunner::new();
        if self.ssh_ready {
            runner.push_success();
        }
        match self.swap_exit_code {
            Some(0) => runner.push_success(),
            Some(code) => runner.push_failure(code),
            None => {}
        }

        ScriptedWorld {
            connector: ScriptedConnector::new(api.clone()),
            api,
            runner,
        }
    }

    /// Driver over the current record wired to `world` with millisecond
    /// waits.
    pub fn driver(&self, world: &ScriptedWorld) -> ScriptedDriver {
        VscaleDriver::with_parts(
            self.record.clone(),
            world.connector.clone(),
            SshClient::new(world.runner.clone()),
        )
        .with_activation_wait(FAST_WAIT)
        .with_ssh_wait(FAST_WAIT)
    }

    /// Option values equivalent to the configured command line.
    pub fn flag_values(&self) -> FlagValues {
        let mut values = FlagValues::with_defaults(&create_flags());
        values.set_string(FLAG_ACCESS_TOKEN, self.access_token.clone());
        values.set_int(FLAG_SWAP_FILE, self.swap_file);
        values
    }

    /// Copies what the scripted collaborators saw into the context.
    pub fn observe(&mut self, world: &ScriptedWorld) {
        self.api_calls = world.api.calls();
        self.commands = world.runner.invocations();
    }

    /// Writes a key pair where the driver looks for it so no `ssh-keygen`
    /// run is needed.
    pub fn seed_key_pair(&self) -> Result<(), LifecycleTestError> {
        let dir = self.root.join("machines").join(MACHINE_NAME);
        std::fs::create_dir_all(&dir).map_err(|err| LifecycleTestError::Store(err.to_string()))?;
        std::fs::write(dir.join("id_rsa"), "private")
            .map_err(|err| LifecycleTestError::Store(err.to_string()))?;
        std::fs::write(dir.join("id_rsa.pub"), PUBLIC_KEY)
            .map_err(|err| LifecycleTestError::Store(err.to_string()))
    }
}

#[fixture]
pub fn lifecycle_context_result() -> LifecycleContextResult {
    build_lifecycle_context()
}

#[fixture]
pub fn lifecycle_context(lifecycle_context_result: LifecycleContextResult) -> LifecycleContext {
    lifecycle_context_result
        .unwrap_or_else(|err| panic!("lifecycle context fixture should initialise: {err}"))
}

fn build_lifecycle_context() -> LifecycleContextResult {
    let tmp = TempDir::new().map_err(|err| LifecycleTestError::Store(format!("tempdir: {err}")))?;
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).map_err(|path| {
        LifecycleTestError::Store(format!("non-utf8 tempdir path: {}", path.display()))
    })?;

    Ok(LifecycleContext {
        access_token: String::new(),
        swap_file: 0,
        scalet_activates: false,
        ssh_ready: false,
        swap_exit_code: None,
        key_removal: None,
        scalet_removal: false,
        record: MachineRecord::new(MACHINE_NAME, root.clone()),
        root,
        api_calls: Vec::new(),
        commands: Vec::new(),
        outcome: None,
        store_tmp: Arc::new(tmp),
    })
}
