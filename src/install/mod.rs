//! Staged installation of bundled services.
//!
//! Every bundle runs through the same pipeline: download the archive into
//! `tmp/`, unpack it into `tmp/staging/<version>`, flatten the vendor's
//! wrapper directory, apply per-service configuration, and finally rename the
//! staging directory onto `bin/<kind>/<version>`. Configuration always refers
//! to the final location, so nothing needs rewriting after the rename. A
//! failure before the rename removes the staging directory and keeps the
//! downloaded archive for the next attempt.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    archive,
    config::StackConfig,
    constants::{ACTIVE_KEY, ServiceKind},
    download::{self, Fetcher},
    error::StackError,
    runtime::StackLayout,
};

pub mod httpd;
pub mod mariadb;
pub mod php;
pub mod tools;

/// A downloadable vendor archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub kind: ServiceKind,
    pub version: String,
    pub url: String,
    /// Directory inside the archive that wraps every other entry.
    pub wrapper: Option<String>,
}

impl Bundle {
    /// File name the archive is saved under in `tmp/`.
    pub fn archive_name(&self) -> String {
        download::file_name_from_url(&self.url)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.zip", self.version))
    }
}

/// A single-file auxiliary tool placed in `bin/etc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBundle {
    pub file_name: String,
    pub url: String,
    pub executable: bool,
}

/// Pipeline position of one installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallStatus {
    NotInstalled,
    Downloading,
    Extracting,
    Relocating,
    Configuring,
    Installed,
    Failed,
}

impl InstallStatus {
    /// Whether the pipeline is finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed)
    }

    /// Status only moves forward, and never leaves a terminal state.
    pub fn can_advance_to(self, next: InstallStatus) -> bool {
        !self.is_terminal() && next > self
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotInstalled => "not installed",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Relocating => "relocating",
            Self::Configuring => "configuring",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One run of the install pipeline for a bundle.
#[derive(Debug, Clone)]
pub struct StackInstallation {
    pub kind: ServiceKind,
    pub version: String,
    pub install_dir: PathBuf,
    status: InstallStatus,
}

impl StackInstallation {
    fn new(kind: ServiceKind, version: &str, install_dir: PathBuf) -> Self {
        Self {
            kind,
            version: version.to_string(),
            install_dir,
            status: InstallStatus::NotInstalled,
        }
    }

    /// Current pipeline status.
    pub fn status(&self) -> InstallStatus {
        self.status
    }

    fn advance(&mut self, next: InstallStatus) {
        if !self.status.can_advance_to(next) {
            warn!(
                "Ignoring {} transition {} -> {next}",
                self.version, self.status
            );
            return;
        }
        debug!("{} {}: {} -> {next}", self.kind, self.version, self.status);
        self.status = next;
    }
}

/// Per-bundle configuration step, run against the staging directory.
///
/// Receives `(staging_dir, final_dir)`.
pub type ConfigureStep<'s> = Box<dyn FnOnce(&Path, &Path) -> Result<(), StackError> + 's>;

/// Runs install pipelines against one stack directory.
pub struct Installer<'a> {
    layout: &'a StackLayout,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Installer<'a> {
    pub fn new(layout: &'a StackLayout, fetcher: &'a dyn Fetcher) -> Self {
        Self { layout, fetcher }
    }

    pub fn layout(&self) -> &StackLayout {
        self.layout
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher
    }

    /// Downloads `bundle` into `tmp/` unless it is already there.
    pub fn fetch_archive(&self, bundle: &Bundle) -> Result<PathBuf, StackError> {
        let archive = self.layout.tmp_dir().join(bundle.archive_name());
        download::download_if_missing(self.fetcher, &bundle.url, &archive)?;
        Ok(archive)
    }

    /// Runs the full pipeline for `bundle`.
    pub fn install(
        &self,
        bundle: &Bundle,
        configure: ConfigureStep<'_>,
    ) -> Result<StackInstallation, StackError> {
        let final_dir = self.layout.install_dir(bundle.kind, &bundle.version);
        let mut installation = StackInstallation::new(bundle.kind, &bundle.version, final_dir.clone());

        if final_dir.exists() {
            return Err(StackError::AlreadyInstalled {
                kind: bundle.kind,
                version: bundle.version.clone(),
                path: final_dir,
            });
        }

        let staging = self.layout.staging_dir().join(&bundle.version);
        info!("Installing {} {}", bundle.kind, bundle.version);

        match self.run_stages(bundle, &mut installation, &staging, &final_dir, configure) {
            Ok(archive) => {
                installation.advance(InstallStatus::Installed);
                if let Err(err) = fs::remove_file(&archive) {
                    warn!("Failed to remove downloaded archive {:?}: {err}", archive);
                }
                info!("{} {} installed at {:?}", bundle.kind, bundle.version, final_dir);
                Ok(installation)
            }
            Err(err) => {
                installation.advance(InstallStatus::Failed);
                if let Err(cleanup) = remove_dir_if_present(&staging) {
                    warn!("Failed to remove staging directory {:?}: {cleanup}", staging);
                }
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        bundle: &Bundle,
        installation: &mut StackInstallation,
        staging: &Path,
        final_dir: &Path,
        configure: ConfigureStep<'_>,
    ) -> Result<PathBuf, StackError> {
        installation.advance(InstallStatus::Downloading);
        let archive = self.fetch_archive(bundle)?;

        installation.advance(InstallStatus::Extracting);
        remove_dir_if_present(staging).map_err(StackError::io(staging))?;
        archive::extract(&archive, staging)?;

        installation.advance(InstallStatus::Relocating);
        if let Some(wrapper) = &bundle.wrapper {
            archive::flatten_wrapper(staging, wrapper)?;
        }

        installation.advance(InstallStatus::Configuring);
        configure(staging, final_dir)?;

        commit(staging, final_dir)?;
        Ok(archive)
    }

    /// Records each selection in `wamp.ini` unless the operator already set
    /// one for that service.
    pub fn record_active(&self, selections: &[(ServiceKind, &str)]) -> Result<(), StackError> {
        StackConfig::update(&self.layout.config_path(), |config| {
            for (kind, version) in selections {
                let section = kind.to_string();
                if config.get(&section, ACTIVE_KEY).is_none() {
                    info!("Selecting {kind} {version}");
                    config.set(&section, ACTIVE_KEY, version);
                }
            }
        })?;
        Ok(())
    }
}

fn commit(staging: &Path, final_dir: &Path) -> Result<(), StackError> {
    if let Some(parent) = final_dir.parent() {
        fs::create_dir_all(parent).map_err(StackError::io(parent))?;
    }
    fs::rename(staging, final_dir).map_err(StackError::io(final_dir))?;
    debug!("Committed {:?} -> {:?}", staging, final_dir);
    Ok(())
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
