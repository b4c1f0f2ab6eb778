//! BDD step definitions for the machine lifecycle.

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use vscale_machine::Driver;
use vscale_machine::ssh::swap_file_script;
use vscale_machine::test_support::ApiCall;

use super::test_helpers::{KeyRemoval, LifecycleContext, LifecycleResult, LifecycleTestError};
use crate::test_constants::{MACHINE_NAME, PUBLIC_IP, SCALET_ID, SSH_KEY_ID};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] LifecycleTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a configured driver with access token \"{token}\"")]
fn configured_driver(
    mut lifecycle_context: LifecycleContext,
    token: String,
) -> Result<LifecycleContext, StepError> {
    lifecycle_context.access_token = token;
    lifecycle_context.seed_key_pair()?;
    Ok(lifecycle_context)
}

#[given("a created machine")]
fn created_machine(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    let record = &mut lifecycle_context.record;
    record.access_token = String::from("abc");
    record.scalet_id = Some(SCALET_ID);
    record.ssh_key_id = Some(SSH_KEY_ID);
    record.ip_address = Some(PUBLIC_IP.to_owned());
    lifecycle_context
}

#[given("the swap file size is \"{megabytes}\"")]
fn swap_file_size(mut lifecycle_context: LifecycleContext, megabytes: i64) -> LifecycleContext {
    lifecycle_context.swap_file = megabytes;
    lifecycle_context
}

#[given("the provider activates the scalet")]
fn provider_activates(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.scalet_activates = true;
    lifecycle_context
}

#[given("ssh accepts connections")]
fn ssh_accepts(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.ssh_ready = true;
    lifecycle_context
}

#[given("the swap script succeeds")]
fn swap_succeeds(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.swap_exit_code = Some(0);
    lifecycle_context
}

#[given("the swap script fails with exit code \"{code}\"")]
fn swap_fails(mut lifecycle_context: LifecycleContext, code: i32) -> LifecycleContext {
    lifecycle_context.swap_exit_code = Some(code);
    lifecycle_context
}

#[given("the provider accepts key removal")]
fn key_removal_accepted(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.key_removal = Some(KeyRemoval::Accepted);
    lifecycle_context
}

#[given("the provider rejects key removal")]
fn key_removal_rejected(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.key_removal = Some(KeyRemoval::Rejected);
    lifecycle_context
}

#[given("the provider accepts scalet removal")]
fn scalet_removal_accepted(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.scalet_removal = true;
    lifecycle_context
}

#[when("I create the machine")]
fn create_machine(mut lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let world = lifecycle_context.script();
    let mut driver = lifecycle_context.driver(&world);
    driver
        .set_config_from_flags(&lifecycle_context.flag_values())
        .map_err(|err| StepError::Assertion(format!("configure driver: {err}")))?;

    let result = runtime.block_on(driver.create());

    lifecycle_context.observe(&world);
    lifecycle_context.record = driver.into_record();
    lifecycle_context.outcome = Some(outcome_of(result));
    Ok(lifecycle_context)
}

#[when("I remove the machine")]
fn remove_machine(mut lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let world = lifecycle_context.script();
    let driver = lifecycle_context.driver(&world);

    let result = runtime.block_on(driver.remove());

    lifecycle_context.observe(&world);
    lifecycle_context.outcome = Some(outcome_of(result));
    Ok(lifecycle_context)
}

fn outcome_of<E: std::fmt::Display>(result: Result<(), E>) -> LifecycleResult {
    match result {
        Ok(()) => LifecycleResult::Success,
        Err(err) => LifecycleResult::Failure(err.to_string()),
    }
}

#[then("the lifecycle result is successful")]
fn lifecycle_success(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match lifecycle_context.outcome {
        Some(LifecycleResult::Success) => Ok(()),
        Some(LifecycleResult::Failure(ref message)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the lifecycle error mentions \"{text}\"")]
fn lifecycle_error_mentions(
    lifecycle_context: &LifecycleContext,
    text: String,
) -> Result<(), StepError> {
    let Some(LifecycleResult::Failure(message)) = &lifecycle_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if message.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected error mentioning {text:?}, got: {message}"
        )))
    }
}

#[then("the provider receives a key registration and a scalet creation")]
fn key_then_scalet(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = &lifecycle_context.api_calls;
    match calls.as_slice() {
        [
            ApiCall::CreateSshKey { name, .. },
            ApiCall::CreateScalet(request),
            ApiCall::GetScalet(ctid),
        ] if name == MACHINE_NAME
            && request.keys == [SSH_KEY_ID]
            && request.do_start
            && *ctid == SCALET_ID =>
        {
            Ok(())
        }
        _ => Err(StepError::Assertion(format!(
            "unexpected provider calls: {calls:?}"
        ))),
    }
}

#[then("no ssh session is opened")]
fn no_ssh(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let invocations = &lifecycle_context.commands;
    if invocations.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no commands, got {invocations:?}"
        )))
    }
}

#[then("the machine address is \"{address}\"")]
fn machine_address(lifecycle_context: &LifecycleContext, address: String) -> Result<(), StepError> {
    match lifecycle_context.record.ip_address.as_deref() {
        Some(ip) if ip == address => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {address}, got {other:?}"
        ))),
    }
}

#[then("the swap script runs over ssh")]
fn swap_script_ran(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let invocations = &lifecycle_context.commands;
    let swap = invocations
        .last()
        .ok_or_else(|| StepError::Assertion(String::from("missing ssh invocation")))?;
    let expected = swap_file_script(1024);
    if swap.program == "ssh" && swap.command_string().ends_with(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected swap script over ssh, got: {}",
            swap.command_string()
        )))
    }
}

#[then("the scalet id is recorded")]
fn scalet_id_recorded(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if lifecycle_context.record.scalet_id == Some(SCALET_ID) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected scalet {SCALET_ID}, got {:?}",
            lifecycle_context.record.scalet_id
        )))
    }
}

#[then("the key is removed before the scalet")]
fn key_before_scalet(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = &lifecycle_context.api_calls;
    if *calls == [
        ApiCall::RemoveSshKey(SSH_KEY_ID),
        ApiCall::RemoveScalet(SCALET_ID),
    ] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected provider calls: {calls:?}"
        )))
    }
}

#[then("the scalet is not removed")]
fn scalet_kept(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = &lifecycle_context.api_calls;
    if calls.contains(&ApiCall::RemoveScalet(SCALET_ID)) {
        Err(StepError::Assertion(String::from(
            "scalet removal should not be attempted",
        )))
    } else {
        Ok(())
    }
}
