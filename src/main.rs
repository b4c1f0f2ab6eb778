//! Binary entry point for the `vscale-machine` CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vscale_machine::vscale::{
    FLAG_ACCESS_TOKEN, FLAG_LOCATION, FLAG_MADE_FROM, FLAG_RPLAN, FLAG_SWAP_FILE, create_flags,
};
use vscale_machine::{
    Driver, FlagValues, MachineStore, StoreError, VscaleConfig, VscaleDriver, VscaleDriverError,
    resolve_state,
};

mod cli;

use cli::{Cli, Command, CreateCommand};

const STORAGE_DIR_NAME: &str = ".vscale-machine";
const LOG_ENV: &str = "VSCALE_MACHINE_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Driver(#[from] VscaleDriverError),
    #[error("machine {0} already exists")]
    AlreadyExists(String),
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let exit_code = match dispatch(cli, &cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling pending waits");
            cancel.cancel();
        }
    });
}

async fn dispatch(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    if matches!(cli.command, Command::Flags) {
        return print_flags();
    }

    let store = MachineStore::new(storage_root(cli.storage_path)?);
    match cli.command {
        Command::Create(args) => create(&store, &args, cancel).await,
        Command::Start(args) => Ok(load_driver(&store, &args.name, cancel)?.start().await?),
        Command::Stop(args) => Ok(load_driver(&store, &args.name, cancel)?.stop().await?),
        Command::Restart(args) => Ok(load_driver(&store, &args.name, cancel)?.restart().await?),
        Command::Kill(args) => Ok(load_driver(&store, &args.name, cancel)?.kill().await?),
        Command::Remove(args) => {
            load_driver(&store, &args.name, cancel)?.remove().await?;
            store.remove(&args.name)?;
            info!(machine = %args.name, "machine removed");
            Ok(())
        }
        Command::State(args) => {
            let driver = load_driver(&store, &args.name, cancel)?;
            let (state, err) = resolve_state(driver.get_state().await);
            print_line(state)?;
            err.map_or(Ok(()), |failure| Err(failure.into()))
        }
        Command::Ip(args) => print_line(load_driver(&store, &args.name, cancel)?.get_ip()?),
        Command::SshHostname(args) => {
            print_line(load_driver(&store, &args.name, cancel)?.get_ssh_hostname()?)
        }
        Command::Url(args) => print_line(load_driver(&store, &args.name, cancel)?.get_url()?),
        Command::Flags => print_flags(),
    }
}

async fn create(
    store: &MachineStore,
    args: &CreateCommand,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    if store.exists(&args.name)? {
        return Err(CliError::AlreadyExists(args.name.clone()));
    }

    let config =
        VscaleConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let values = apply_overrides(config.to_flag_values(), args);

    let mut driver =
        VscaleDriver::new(args.name.clone(), store.root()).with_cancellation(cancel.clone());
    driver.set_config_from_flags(&values)?;
    driver.pre_create_check()?;

    // Persist even on failure so the scalet can still be removed.
    let outcome = driver.create().await;
    let saved = store.save(driver.record());
    outcome?;
    let path = saved?;
    info!(machine = %args.name, %path, "machine created");
    Ok(())
}

fn apply_overrides(mut values: FlagValues, args: &CreateCommand) -> FlagValues {
    let strings = [
        (FLAG_ACCESS_TOKEN, &args.access_token),
        (FLAG_LOCATION, &args.location),
        (FLAG_MADE_FROM, &args.made_from),
        (FLAG_RPLAN, &args.rplan),
    ];
    for (flag, value) in strings {
        if let Some(text) = value {
            values.set_string(flag, text.clone());
        }
    }
    if let Some(megabytes) = args.swap_file {
        values.set_int(FLAG_SWAP_FILE, i64::from(megabytes));
    }
    values
}

fn load_driver(
    store: &MachineStore,
    name: &str,
    cancel: &CancellationToken,
) -> Result<VscaleDriver, CliError> {
    let record = store.load(name)?;
    Ok(VscaleDriver::from_record(record).with_cancellation(cancel.clone()))
}

fn storage_root(explicit: Option<String>) -> Result<Utf8PathBuf, CliError> {
    explicit
        .filter(|path| !path.trim().is_empty())
        .map_or_else(default_storage_root, |path| Ok(Utf8PathBuf::from(path)))
}

fn default_storage_root() -> Result<Utf8PathBuf, CliError> {
    let home = env::var("HOME").map_err(|_| {
        CliError::Config(String::from(
            "cannot determine the home directory; set MACHINE_STORAGE_PATH or --storage-path",
        ))
    })?;
    Ok(Utf8PathBuf::from(home).join(STORAGE_DIR_NAME))
}

fn print_flags() -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for flag in create_flags() {
        writeln!(stdout, "{flag}").map_err(|err| CliError::Output(err.to_string()))?;
    }
    Ok(())
}

fn print_line(value: impl std::fmt::Display) -> Result<(), CliError> {
    writeln!(io::stdout(), "{value}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
