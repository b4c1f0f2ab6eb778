//! On-disk persistence of machine records.
//!
//! Each machine lives in `<root>/machines/<name>/`, holding its SSH key pair
//! and a `config.json` with the serialised [`MachineRecord`].

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::debug;

use crate::vscale::MachineRecord;

/// Directory below the storage root holding one directory per machine.
pub const MACHINES_DIR: &str = "machines";

/// File name of the serialised record inside a machine directory.
pub const RECORD_FILE: &str = "config.json";

/// Errors raised while reading or writing machine records.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when the machine has no stored record.
    #[error("machine {name} does not exist")]
    NotFound {
        /// Machine name.
        name: String,
    },
    /// Raised when a machine name cannot be used as a directory name.
    #[error("invalid machine name {name:?}: {message}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why the name was rejected.
        message: String,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a stored record cannot be encoded or decoded.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the record.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Returns the directory of machine `name` below `root`.
#[must_use]
pub fn machine_dir(root: &Utf8Path, name: &str) -> Utf8PathBuf {
    root.join(MACHINES_DIR).join(name)
}

/// Machine records stored below a root directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

impl MachineStore {
    /// Store rooted at `root`; nothing is created until a record is saved.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory of machine `name`.
    #[must_use]
    pub fn machine_dir(&self, name: &str) -> Utf8PathBuf {
        machine_dir(&self.root, name)
    }

    /// Reports whether a record exists for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for unusable names and
    /// [`StoreError::Io`] when the storage directory cannot be read.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let machines = self.root.join(MACHINES_DIR);
        let Some(dir) = open_dir_if_present(&machines)? else {
            return Ok(false);
        };
        let relative = Utf8Path::new(name).join(RECORD_FILE);
        dir.try_exists(&relative).map_err(|err| io_error(&machines.join(&relative), &err))
    }

    /// Writes `record`, creating the machine directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory or file cannot be
    /// written and [`StoreError::Parse`] when encoding fails.
    pub fn save(&self, record: &MachineRecord) -> Result<Utf8PathBuf, StoreError> {
        validate_name(&record.machine_name)?;
        let dir_path = self.machine_dir(&record.machine_name);
        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;

        let path = dir_path.join(RECORD_FILE);
        let rendered = serde_json::to_string_pretty(record).map_err(|err| StoreError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        dir.write(RECORD_FILE, rendered)
            .map_err(|err| io_error(&path, &err))?;
        debug!(%path, "saved machine record");
        Ok(path)
    }

    /// Reads the record of machine `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists,
    /// [`StoreError::Io`] when it cannot be read and [`StoreError::Parse`]
    /// when it is malformed.
    pub fn load(&self, name: &str) -> Result<MachineRecord, StoreError> {
        validate_name(name)?;
        let dir_path = self.machine_dir(name);
        let not_found = || StoreError::NotFound {
            name: name.to_owned(),
        };
        let dir = open_dir_if_present(&dir_path)?.ok_or_else(not_found)?;

        let path = dir_path.join(RECORD_FILE);
        let contents = match dir.read_to_string(RECORD_FILE) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(io_error(&path, &err)),
        };
        serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Deletes the directory of machine `name`, including its keys.
    /// Removing a machine that is not stored succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be removed.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let machines = self.root.join(MACHINES_DIR);
        let Some(dir) = open_dir_if_present(&machines)? else {
            return Ok(());
        };
        match dir.remove_dir_all(name) {
            Ok(()) => {
                debug!(machine = name, "removed machine directory");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&machines.join(name), &err)),
        }
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |message: &str| StoreError::InvalidName {
        name: name.to_owned(),
        message: message.to_owned(),
    };
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(invalid("name must be a single path component"));
    }
    Ok(())
}

fn open_dir_if_present(path: &Utf8Path) -> Result<Option<Dir>, StoreError> {
    match Dir::open_ambient_dir(path, ambient_authority()) {
        Ok(dir) => Ok(Some(dir)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(path, &err)),
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
