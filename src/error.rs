//! Error handling for wamp.
use std::{io, path::PathBuf};

use thiserror::Error;

use crate::constants::ServiceKind;

/// Defines all possible errors that can occur while managing the stack.
#[derive(Debug, Error)]
pub enum StackError {
    /// The target install directory for a bundle already exists.
    #[error("{kind} {version} is already installed at {}", .path.display())]
    AlreadyInstalled {
        /// Kind of bundle being installed.
        kind: ServiceKind,
        /// Version identifier of the bundle.
        version: String,
        /// Existing install directory.
        path: PathBuf,
    },

    /// The auxiliary tools are already present in `bin/etc`.
    #[error("Auxiliary tools are already installed ({})", .path.display())]
    ToolsInstalled {
        /// Existing certificate tool.
        path: PathBuf,
    },

    /// The active version of a service has no install directory.
    #[error("{kind} {version} is not installed (expected {})", .path.display())]
    NotInstalled {
        /// Kind of bundle that was expected.
        kind: ServiceKind,
        /// Version identifier from the stack configuration.
        version: String,
        /// Missing install directory.
        path: PathBuf,
    },

    /// A live registry entry already tracks this service.
    #[error("Service '{service}' is already running{}", describe_pid(.pid))]
    AlreadyRunning {
        /// The service name.
        service: String,
        /// The recorded PID, if the registry entry had one yet.
        pid: Option<u32>,
    },

    /// No registry entry exists for this service.
    #[error("Service '{service}' is not running")]
    NotRunning {
        /// The service name.
        service: String,
    },

    /// One or more services are still running.
    #[error("Stop running services before continuing: {}", .services.join(", "))]
    ServicesRunning {
        /// Names of the services with live registry entries.
        services: Vec<String>,
    },

    /// The site already has a document root or a vhost fragment.
    #[error("Site '{site}' already exists ({})", .path.display())]
    SiteExists {
        /// Site hostname.
        site: String,
        /// First existing artifact that blocked the add.
        path: PathBuf,
    },

    /// The scripting runtime selected for a site is not installed.
    #[error("Selected PHP runtime does not exist: {}", .path.display())]
    RuntimeMissing {
        /// Runtime directory that was looked up.
        path: PathBuf,
    },

    /// Certificate material for the site already exists.
    #[error("TLS material already exists: {}", .path.display())]
    CertExists {
        /// Existing certificate or key file.
        path: PathBuf,
    },

    /// The site name is not a usable hostname.
    #[error("Invalid site name '{0}': expected a hostname such as 'example.test'")]
    InvalidSiteName(String),

    /// Filesystem operation failed.
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Network transfer failed.
    #[error("Failed to download {url}: {source}")]
    Download {
        /// Source URL.
        url: String,
        /// The underlying error that occurred.
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("Failed to download {url}: server responded with {status}")]
    DownloadStatus {
        /// Source URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The archive could not be read or unpacked.
    #[error("Failed to extract {}: {reason}", .path.display())]
    Archive {
        /// Archive path.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// The archive extension is not one we can unpack.
    #[error("Unsupported archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    /// An expected file or directory is missing from a vendor artifact.
    #[error("Missing {what}: {}", .path.display())]
    MissingComponent {
        /// What was expected.
        what: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// An external tool could not be launched.
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        /// Program path.
        program: String,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("'{program}' {}", describe_exit(.code, .output))]
    Subprocess {
        /// Program path.
        program: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured diagnostic output.
        output: String,
    },

    /// Error spawning a service process.
    #[error("Failed to start service '{service}': {source}")]
    ServiceStartError {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Error stopping a service process.
    #[error("Failed to stop service '{service}': {source}")]
    ServiceStopError {
        /// The service name that failed to stop.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Error for the PID registry.
    #[error("PID registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error for the stack configuration file.
    #[error("Stack configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StackError {
    /// Builds a closure that wraps an `io::Error` with the path it concerns.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> StackError {
        let path = path.into();
        move |source| StackError::Io { path, source }
    }
}

fn describe_pid(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(" (PID {pid})")).unwrap_or_default()
}

fn describe_exit(code: &Option<i32>, output: &str) -> String {
    let status = match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    };
    if output.is_empty() {
        status
    } else {
        format!("{status}: {output}")
    }
}

/// Error type for PID registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Error reading or writing a registry file.
    #[error("Failed to access {}: {source}", .path.display())]
    Access {
        /// Registry file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The registry file does not hold a decimal PID.
    #[error("Registry file {} holds an invalid PID: '{contents}'", .path.display())]
    InvalidPid {
        /// Registry file path.
        path: PathBuf,
        /// Raw file contents.
        contents: String,
    },
}

/// Error type for the persisted stack configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or writing the configuration file.
    #[error("Failed to access {}: {source}", .path.display())]
    Access {
        /// Configuration file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// A required key is absent.
    #[error("[{section}] {key} is not set; run `wamp install` first")]
    MissingKey {
        /// Section name.
        section: String,
        /// Key name.
        key: String,
    },
}
