//! Multi-step provisioning and teardown sequences.

use tokio::task;
use tracing::{debug, info};

use super::{ApiConnector, CreateScaletRequest, ScaletApi, VscaleDriver, VscaleDriverError};
use crate::ssh::{CommandRunner, SshClient, SshError, swap_file_script};
use crate::wait::{Poll, poll_until};

impl<C, R> VscaleDriver<C, R>
where
    C: ApiConnector + Send + Sync,
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Generates the machine key pair and registers its public half.
    pub(super) async fn create_ssh_key(&mut self, api: &C::Api) -> Result<(), VscaleDriverError> {
        let key_path = self.record.resolved_ssh_key_path();
        let public_key = self
            .ssh_task("ssh-keygen", move |ssh| {
                ssh.generate_key(&key_path)?;
                ssh.read_public_key(&key_path)
            })
            .await?;

        let key = api
            .create_ssh_key(&public_key, &self.record.machine_name)
            .await?;
        self.record.ssh_key_id = Some(key.id);
        info!(machine = %self.record.machine_name, key_id = key.id, "ssh key registered");
        Ok(())
    }

    /// Creates the scalet and waits until it is active with a public
    /// address.
    pub(super) async fn create_scalet(&mut self, api: &C::Api) -> Result<(), VscaleDriverError> {
        let key_id = self
            .record
            .ssh_key_id
            .ok_or_else(|| self.not_created("ssh key"))?;
        let request = CreateScaletRequest {
            make_from: self.record.made_from.clone(),
            rplan: self.record.rplan.clone(),
            do_start: true,
            name: self.record.machine_name.clone(),
            keys: vec![key_id],
            location: self.record.location.clone(),
        };

        let ctid = api.create_scalet(&request).await?.ctid;
        self.record.scalet_id = Some(ctid);
        info!(machine = %self.record.machine_name, ctid, "scalet created");

        let action = format!("scalet {ctid} to become active");
        let address = poll_until(&action, self.activation_wait, &self.cancel, move || async move {
            let scalet = api.get_scalet(ctid).await?;
            debug!(ctid, status = %scalet.status, active = scalet.active, "scalet status");
            Ok::<_, VscaleDriverError>(match scalet.public_ip() {
                Some(ip) if scalet.active => Poll::Ready(ip.to_owned()),
                _ => Poll::Pending,
            })
        })
        .await?;

        info!(machine = %self.record.machine_name, ctid, %address, "scalet active");
        self.record.ip_address = Some(address);
        Ok(())
    }

    /// Provisions the swap file once SSH accepts connections. Does nothing
    /// when no swap size is configured.
    pub(super) async fn create_swap_file(&self) -> Result<(), VscaleDriverError> {
        let megabytes = self.record.swap_file;
        if megabytes == 0 {
            return Ok(());
        }

        let target = self.ssh_target()?;
        let probe_target = &target;
        let action = format!("ssh on {}", target.host);
        let probe_action = action.as_str();
        poll_until(&action, self.ssh_wait, &self.cancel, move || {
            let attempt_target = probe_target.clone();
            async move {
                let reachable = self
                    .cancellable_ssh_task(probe_action, move |ssh| {
                        ssh.is_reachable(&attempt_target)
                    })
                    .await?;
                Ok::<_, VscaleDriverError>(if reachable {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                })
            }
        })
        .await?;

        let script = swap_file_script(megabytes);
        let swap_action = format!("swap file on {}", target.host);
        self.cancellable_ssh_task(&swap_action, move |ssh| ssh.run(&target, &script))
            .await?;
        info!(machine = %self.record.machine_name, megabytes, "swap file configured");
        Ok(())
    }

    /// Removes the SSH key, then the scalet. A failed key removal leaves the
    /// scalet untouched. Resources that were never created are skipped.
    pub(super) async fn remove_resources(&self, api: &C::Api) -> Result<(), VscaleDriverError> {
        let machine = self.record.machine_name.as_str();
        match self.record.ssh_key_id {
            Some(key_id) => {
                api.remove_ssh_key(key_id).await?;
                info!(machine, key_id, "ssh key removed");
            }
            None => debug!(machine, "no ssh key to remove"),
        }

        match self.record.scalet_id {
            Some(ctid) => {
                api.remove_scalet(ctid).await?;
                info!(machine, ctid, "scalet removed");
            }
            None => debug!(machine, "no scalet to remove"),
        }
        Ok(())
    }

    /// Runs a blocking SSH client call on the blocking thread pool.
    async fn ssh_task<T, F>(&self, program: &str, call: F) -> Result<T, VscaleDriverError>
    where
        T: Send + 'static,
        F: FnOnce(SshClient<R>) -> Result<T, SshError> + Send + 'static,
    {
        let ssh = self.ssh.clone();
        let outcome = task::spawn_blocking(move || call(ssh))
            .await
            .map_err(|err| VscaleDriverError::Worker {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
        Ok(outcome?)
    }

    /// Like [`Self::ssh_task`], but stops waiting as soon as the driver is
    /// cancelled. The command itself is left to finish in the background.
    async fn cancellable_ssh_task<T, F>(
        &self,
        action: &str,
        call: F,
    ) -> Result<T, VscaleDriverError>
    where
        T: Send + 'static,
        F: FnOnce(SshClient<R>) -> Result<T, SshError> + Send + 'static,
    {
        tokio::select! {
            outcome = self.ssh_task("ssh", call) => outcome,
            () = self.cancel.cancelled() => Err(VscaleDriverError::Cancelled {
                action: action.to_owned(),
            }),
        }
    }
}
