//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `scalet.toml` configuration files, and
//! `VSCALE_*` environment variables. The CLI layers its `--vscale-*` flags
//! on top before handing the result to the driver as [`FlagValues`].

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::flags::FlagValues;
use crate::vscale::{
    DEFAULT_LOCATION, DEFAULT_MADE_FROM, DEFAULT_RPLAN, DEFAULT_SWAP_FILE, FLAG_ACCESS_TOKEN,
    FLAG_LOCATION, FLAG_MADE_FROM, FLAG_RPLAN, FLAG_SWAP_FILE,
};

/// Vscale driver settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VSCALE",
    discovery(
        app_name = "scalet",
        env_var = "SCALET_CONFIG_PATH",
        config_file_name = "scalet.toml",
        dotfile_name = ".scalet.toml",
        project_file_name = "scalet.toml"
    )
)]
pub struct VscaleConfig {
    /// API access token. Required before any remote operation.
    pub access_token: Option<String>,
    /// Datacenter location. Defaults to `spb0`.
    #[ortho_config(default = DEFAULT_LOCATION.to_owned())]
    pub location: String,
    /// Base image identifier.
    #[ortho_config(default = DEFAULT_MADE_FROM.to_owned())]
    pub made_from: String,
    /// Resource plan identifier. Defaults to `small`.
    #[ortho_config(default = DEFAULT_RPLAN.to_owned())]
    pub rplan: String,
    /// Swap file size in megabytes; zero disables the swap file.
    #[ortho_config(default = DEFAULT_SWAP_FILE)]
    pub swap_file: u32,
}

impl VscaleConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vscale-machine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Converts the merged settings into the option map read by the driver.
    #[must_use]
    pub fn to_flag_values(&self) -> FlagValues {
        FlagValues::new()
            .with_string(
                FLAG_ACCESS_TOKEN,
                self.access_token.clone().unwrap_or_default(),
            )
            .with_string(FLAG_LOCATION, self.location.clone())
            .with_string(FLAG_MADE_FROM, self.made_from.clone())
            .with_string(FLAG_RPLAN, self.rplan.clone())
            .with_int(FLAG_SWAP_FILE, i64::from(self.swap_file))
    }
}

impl Default for VscaleConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            location: DEFAULT_LOCATION.to_owned(),
            made_from: DEFAULT_MADE_FROM.to_owned(),
            rplan: DEFAULT_RPLAN.to_owned(),
            swap_file: DEFAULT_SWAP_FILE,
        }
    }
}

/// Errors raised during configuration loading.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::DriverOptions;
    use crate::test_support::EnvGuard;

    #[test]
    fn flag_values_carry_every_setting() {
        let config = VscaleConfig {
            access_token: Some(String::from("abc")),
            swap_file: 512,
            ..VscaleConfig::default()
        };

        let values = config.to_flag_values();

        assert_eq!(values.string(FLAG_ACCESS_TOKEN), "abc");
        assert_eq!(values.string(FLAG_LOCATION), DEFAULT_LOCATION);
        assert_eq!(values.string(FLAG_MADE_FROM), DEFAULT_MADE_FROM);
        assert_eq!(values.string(FLAG_RPLAN), DEFAULT_RPLAN);
        assert_eq!(values.int(FLAG_SWAP_FILE), 512);
    }

    #[test]
    fn missing_token_maps_to_empty_string() {
        let values = VscaleConfig::default().to_flag_values();
        assert_eq!(values.string(FLAG_ACCESS_TOKEN), "");
    }

    #[tokio::test]
    async fn load_reads_vscale_environment() {
        let _guard = EnvGuard::set_vars(&[
            ("VSCALE_ACCESS_TOKEN", "env-token"),
            ("VSCALE_LOCATION", "msk0"),
            ("VSCALE_SWAP_FILE", "256"),
        ])
        .await;

        let config = VscaleConfig::load_without_cli_args()
            .unwrap_or_else(|err| panic!("load config: {err}"));

        assert_eq!(config.access_token.as_deref(), Some("env-token"));
        assert_eq!(config.location, "msk0");
        assert_eq!(config.rplan, DEFAULT_RPLAN);
        assert_eq!(config.swap_file, 256);
    }
}
