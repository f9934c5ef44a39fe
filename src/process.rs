//! Starts, stops, and inspects one named service process tracked by the PID
//! registry.
use std::{
    fmt,
    fs::{self, OpenOptions},
    io,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use chrono::{DateTime, Utc};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::{
    constants::SERVICE_LOG_SUFFIX,
    error::{RegistryError, StackError},
    registry::{self, PidRegistry, RegistryEntry},
};

/// A running service launched by [`ServiceManager::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProcess {
    /// Service name.
    pub name: String,
    /// OS process id.
    pub pid: u32,
    /// Launched binary.
    pub binary: PathBuf,
    /// Launch arguments.
    pub args: Vec<String>,
    /// Registry file holding `pid`.
    pub registry_file: PathBuf,
}

/// Registry-derived state of a service.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No registry entry.
    Stopped,
    /// Registry entry whose process is alive.
    Running,
    /// Registry entry whose process is gone.
    Stale,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Stale => "stale",
        };
        f.write_str(label)
    }
}

/// Snapshot returned by [`ServiceManager::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.state)?;
        if let Some(pid) = self.pid {
            write!(f, " (PID {pid}")?;
            if let Some(name) = &self.process_name {
                write!(f, ", {name}")?;
            }
            write!(f, ")")?;
        }
        if let Some(since) = self.since {
            write!(f, " since {}", since.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }
}

/// Supervises a single named service.
#[derive(Debug, Clone)]
pub struct ServiceManager {
    name: String,
    binary: PathBuf,
    args: Vec<String>,
    registry: PidRegistry,
}

impl ServiceManager {
    /// Creates a manager for `name`, launching `binary` with `args` and
    /// tracking it in `registry_dir`.
    pub fn new<I, S>(
        name: impl Into<String>,
        binary: impl Into<PathBuf>,
        args: I,
        registry_dir: impl Into<PathBuf>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: args.into_iter().map(Into::into).collect(),
            registry: PidRegistry::new(registry_dir),
        }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry file of this service.
    pub fn registry_file(&self) -> PathBuf {
        self.registry.path_for(&self.name)
    }

    /// File receiving the service's stdout and stderr.
    pub fn log_file(&self) -> PathBuf {
        self.registry
            .dir()
            .join(format!("{}{SERVICE_LOG_SUFFIX}", self.name))
    }

    /// Launches the service detached from this process and records its PID.
    ///
    /// Fails with [`StackError::AlreadyRunning`] while a live registry entry
    /// exists. A registry entry pointing at a dead process is discarded and
    /// the claim retried once.
    pub fn start(&self) -> Result<ServiceProcess, StackError> {
        let claim = match self.registry.try_claim(&self.name)? {
            Some(claim) => claim,
            None => {
                self.discard_stale_entry()?;
                self.registry
                    .try_claim(&self.name)?
                    .ok_or_else(|| StackError::AlreadyRunning {
                        service: self.name.clone(),
                        pid: None,
                    })?
            }
        };

        let pid = match self.spawn() {
            Ok(pid) => pid,
            Err(source) => {
                drop(claim);
                if let Err(err) = self.registry.remove(&self.name) {
                    warn!("Failed to release registry claim for '{}': {err}", self.name);
                }
                return Err(StackError::ServiceStartError {
                    service: self.name.clone(),
                    source,
                });
            }
        };

        self.registry.record(&self.name, claim, pid)?;
        info!("Started '{}' with PID {pid}", self.name);

        Ok(ServiceProcess {
            name: self.name.clone(),
            pid,
            binary: self.binary.clone(),
            args: self.args.clone(),
            registry_file: self.registry_file(),
        })
    }

    /// Clears a registry entry left by a dead process so the claim can be
    /// retried. Live or half-written entries surface as `AlreadyRunning`.
    fn discard_stale_entry(&self) -> Result<(), StackError> {
        let path = self.registry_file();
        match self.registry.read(&self.name) {
            Ok(None) => Ok(()),
            Ok(Some(RegistryEntry::Claimed)) => Err(StackError::AlreadyRunning {
                service: self.name.clone(),
                pid: None,
            }),
            Ok(Some(RegistryEntry::Pid(pid))) if registry::is_alive(pid) => {
                Err(StackError::AlreadyRunning {
                    service: self.name.clone(),
                    pid: Some(pid),
                })
            }
            Ok(Some(RegistryEntry::Pid(pid))) => {
                warn!(
                    "Removing stale registry file {:?}: PID {pid} is no longer running",
                    path
                );
                self.registry.remove(&self.name)?;
                Ok(())
            }
            Err(RegistryError::InvalidPid { contents, .. }) => {
                warn!("Removing unreadable registry file {:?} ('{contents}')", path);
                self.registry.remove(&self.name)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn spawn(&self) -> io::Result<u32> {
        let log_path = self.log_file();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);
        if let Some(dir) = self.binary.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        unsafe {
            cmd.pre_exec(|| {
                // Own session so the service outlives this invocation.
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        debug!("Executing command: {cmd:?}");
        let child = cmd.spawn()?;
        Ok(child.id())
    }

    /// Forcefully terminates the recorded process and removes the registry
    /// entry.
    ///
    /// A process that already exited counts as stopped, and an unreadable
    /// entry is removed without sending any signal. Any other signal failure
    /// keeps the registry file in place.
    pub fn stop(&self) -> Result<(), StackError> {
        let entry = match self.registry.read(&self.name) {
            Ok(entry) => entry,
            Err(RegistryError::InvalidPid { contents, .. }) => {
                warn!(
                    "Removing unreadable registry file {:?} ('{contents}') without signalling",
                    self.registry_file()
                );
                self.registry.remove(&self.name)?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let pid = match entry {
            None => {
                return Err(StackError::NotRunning {
                    service: self.name.clone(),
                });
            }
            Some(RegistryEntry::Claimed) => {
                return Err(StackError::ServiceStopError {
                    service: self.name.clone(),
                    source: io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "registry entry has no PID yet",
                    ),
                });
            }
            Some(RegistryEntry::Pid(pid)) => pid,
        };

        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or_else(|| StackError::ServiceStopError {
                service: self.name.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("PID {pid} out of range"),
                ),
            })?;

        match signal::kill(Pid::from_raw(raw), Some(Signal::SIGKILL)) {
            Ok(()) => info!("Stopped '{}' (PID {pid})", self.name),
            Err(Errno::ESRCH) => {
                warn!(
                    "'{}' (PID {pid}) had already exited; cleaning up registry",
                    self.name
                );
            }
            Err(err) => {
                return Err(StackError::ServiceStopError {
                    service: self.name.clone(),
                    source: io::Error::from_raw_os_error(err as i32),
                });
            }
        }

        self.registry.remove(&self.name)?;
        Ok(())
    }

    /// Reports the registry-derived state of the service.
    pub fn status(&self) -> Result<ServiceStatus, StackError> {
        let entry = match self.registry.read(&self.name) {
            Ok(entry) => entry,
            Err(RegistryError::InvalidPid { .. }) => {
                return Ok(self.snapshot(ServiceState::Stale, None));
            }
            Err(err) => return Err(err.into()),
        };

        let status = match entry {
            None => self.snapshot(ServiceState::Stopped, None),
            Some(RegistryEntry::Claimed) => self.snapshot(ServiceState::Running, None),
            Some(RegistryEntry::Pid(pid)) if registry::is_alive(pid) => {
                self.snapshot(ServiceState::Running, Some(pid))
            }
            Some(RegistryEntry::Pid(pid)) => self.snapshot(ServiceState::Stale, Some(pid)),
        };
        Ok(status)
    }

    fn snapshot(&self, state: ServiceState, pid: Option<u32>) -> ServiceStatus {
        let since = match state {
            ServiceState::Stopped => None,
            _ => modified_at(&self.registry_file()),
        };
        let process_name = match state {
            ServiceState::Running => pid.and_then(process_name),
            _ => None,
        };

        ServiceStatus {
            service: self.name.clone(),
            state,
            pid,
            process_name,
            since,
        }
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn process_name(pid: u32) -> Option<String> {
    let target = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system
        .process(target)
        .map(|process| process.name().to_string_lossy().to_string())
}
