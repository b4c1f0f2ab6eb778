//! Flag descriptors and resolved option values passed to drivers.
//!
//! The host declares each driver's flags up front, resolves them from the
//! command line and environment, and hands the driver a read-only view.
//! Lookups of unknown names yield the zero value, mirroring how the host
//! treats flags that were never registered.

use std::collections::BTreeMap;
use std::fmt;

/// Value type and default of a flag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlagKind {
    /// Free-form string; `None` means the flag has no default.
    String {
        /// Default value applied when the flag is absent.
        default: Option<&'static str>,
    },
    /// Signed integer.
    Int {
        /// Default value applied when the flag is absent.
        default: i64,
    },
}

/// Declaration of a single driver flag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct McnFlag {
    /// Long flag name without the leading dashes.
    pub name: &'static str,
    /// Environment variable that can supply the value.
    pub env_var: &'static str,
    /// One-line help text.
    pub usage: &'static str,
    /// Value type and default.
    pub kind: FlagKind,
}

impl McnFlag {
    /// Declares a string flag.
    #[must_use]
    pub const fn string(
        name: &'static str,
        env_var: &'static str,
        usage: &'static str,
        default: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            env_var,
            usage,
            kind: FlagKind::String { default },
        }
    }

    /// Declares an integer flag.
    #[must_use]
    pub const fn int(
        name: &'static str,
        env_var: &'static str,
        usage: &'static str,
        default: i64,
    ) -> Self {
        Self {
            name,
            env_var,
            usage,
            kind: FlagKind::Int { default },
        }
    }

    /// Renders the default for display, or an empty string when unset.
    #[must_use]
    pub fn default_label(&self) -> String {
        match self.kind {
            FlagKind::String { default } => default.unwrap_or_default().to_owned(),
            FlagKind::Int { default } => default.to_string(),
        }
    }
}

impl fmt::Display for McnFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{} [${}] {}", self.name, self.env_var, self.usage)?;
        let default = self.default_label();
        if !default.is_empty() {
            write!(f, " (default: {default})")?;
        }
        Ok(())
    }
}

/// Read-only view over resolved flag values.
pub trait DriverOptions {
    /// Returns the string value for `name`, or an empty string.
    fn string(&self, name: &str) -> String;

    /// Returns the integer value for `name`, or zero.
    fn int(&self, name: &str) -> i64;
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum FlagValue {
    String(String),
    Int(i64),
}

/// In-memory option map handed to [`crate::Driver::set_config_from_flags`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlagValues {
    values: BTreeMap<String, FlagValue>,
}

impl FlagValues {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a map with the declared defaults of `flags`.
    #[must_use]
    pub fn with_defaults(flags: &[McnFlag]) -> Self {
        let mut values = Self::new();
        for flag in flags {
            match flag.kind {
                FlagKind::String {
                    default: Some(default),
                } => values.set_string(flag.name, default),
                FlagKind::String { default: None } => {}
                FlagKind::Int { default } => values.set_int(flag.name, default),
            }
        }
        values
    }

    /// Sets a string value, replacing any previous value.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.values
            .insert(name.to_owned(), FlagValue::String(value.into()));
    }

    /// Sets an integer value, replacing any previous value.
    pub fn set_int(&mut self, name: &str, value: i64) {
        self.values.insert(name.to_owned(), FlagValue::Int(value));
    }

    /// Builder-style variant of [`FlagValues::set_string`].
    #[must_use]
    pub fn with_string(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_string(name, value);
        self
    }

    /// Builder-style variant of [`FlagValues::set_int`].
    #[must_use]
    pub fn with_int(mut self, name: &str, value: i64) -> Self {
        self.set_int(name, value);
        self
    }
}

impl DriverOptions for FlagValues {
    fn string(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(FlagValue::String(value)) => value.clone(),
            Some(FlagValue::Int(value)) => value.to_string(),
            None => String::new(),
        }
    }

    fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(FlagValue::Int(value)) => *value,
            Some(FlagValue::String(value)) => value.trim().parse().unwrap_or_default(),
            None => 0,
        }
    }
}
