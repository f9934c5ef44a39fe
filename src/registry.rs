//! File-based PID registry: one `<name>_pid` file per running service.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use nix::{errno::Errno, sys::signal, unistd::Pid};
use tracing::debug;

use crate::{constants::PID_FILE_SUFFIX, error::RegistryError};

/// Contents of a registry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEntry {
    /// File exists but no PID has been written yet.
    Claimed,
    /// File holds a PID.
    Pid(u32),
}

/// Directory of PID files.
#[derive(Debug, Clone)]
pub struct PidRegistry {
    dir: PathBuf,
}

impl PidRegistry {
    /// Wraps a registry directory. The directory is created on first claim.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Registry file of service `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{PID_FILE_SUFFIX}"))
    }

    /// Creates the registry file for `name` exclusively.
    ///
    /// Returns `Ok(None)` when the file already exists.
    pub fn try_claim(&self, name: &str) -> Result<Option<File>, RegistryError> {
        fs::create_dir_all(&self.dir).map_err(|source| RegistryError::Access {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                debug!("Claimed registry file {:?}", path);
                Ok(Some(file))
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(RegistryError::Access { path, source }),
        }
    }

    /// Records `pid` in a freshly claimed registry file.
    pub fn record(&self, name: &str, mut claim: File, pid: u32) -> Result<(), RegistryError> {
        let path = self.path_for(name);
        claim
            .write_all(pid.to_string().as_bytes())
            .and_then(|_| claim.sync_all())
            .map_err(|source| RegistryError::Access { path, source })
    }

    /// Reads the entry of `name`, `None` when no registry file exists.
    pub fn read(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let path = self.path_for(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RegistryError::Access { path, source }),
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(Some(RegistryEntry::Claimed));
        }

        // 0 and negative values address process groups, never one process.
        trimmed
            .parse::<u32>()
            .ok()
            .filter(|pid| *pid > 0 && i32::try_from(*pid).is_ok())
            .map(|pid| Some(RegistryEntry::Pid(pid)))
            .ok_or_else(|| RegistryError::InvalidPid {
                path,
                contents: trimmed.to_string(),
            })
    }

    /// Deletes the registry file of `name`. A missing file is not an error.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed registry file {:?}", path);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Access { path, source }),
        }
    }

    /// Service names with a registry file, sorted.
    pub fn services(&self) -> Result<Vec<String>, RegistryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Access {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(PID_FILE_SUFFIX))
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Whether a process with `pid` exists. A process we may not signal still
/// counts as alive.
pub fn is_alive(pid: u32) -> bool {
    let Some(raw) = i32::try_from(pid).ok().filter(|raw| *raw > 0) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}
