//! Per-invocation entry point tying the layout, persisted settings, and
//! workflows together.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    config::{self, ActiveVersions},
    constants::{
        DEFAULT_APACHE_VERSION, DEFAULT_MARIADB_VERSION, DEFAULT_PHP_VERSION, MARIADB_START_ARGS,
        ServiceKind,
    },
    download::Fetcher,
    error::StackError,
    install::{Installer, StackInstallation, php},
    process::{ServiceManager, ServiceProcess, ServiceStatus},
    registry::{self, PidRegistry, RegistryEntry},
    runtime::StackLayout,
    site::{SiteDefinition, SiteProvisioner},
    tools::CertTool,
};

/// Bundle versions installed by [`Stack::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackVersions {
    pub php: String,
    pub apache: String,
    pub mysql: String,
}

impl Default for StackVersions {
    fn default() -> Self {
        Self {
            php: default_version(ServiceKind::Php).to_string(),
            apache: default_version(ServiceKind::Apache).to_string(),
            mysql: default_version(ServiceKind::MariaDb).to_string(),
        }
    }
}

/// A stack directory and the operations available on it.
#[derive(Debug, Clone)]
pub struct Stack {
    layout: StackLayout,
}

impl Stack {
    pub fn new(layout: StackLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StackLayout {
        &self.layout
    }

    /// Creates every directory of the layout. Safe to repeat.
    pub fn init(&self) -> Result<(), StackError> {
        info!("Initializing stack directory {:?}", self.layout.root());
        for dir in self.layout.skeleton() {
            fs::create_dir_all(&dir).map_err(StackError::io(&dir))?;
        }
        Ok(())
    }

    /// Installs runtime, web server, database, and tools, in that order, then
    /// records the active versions.
    pub fn install(
        &self,
        fetcher: &dyn Fetcher,
        versions: &StackVersions,
    ) -> Result<Vec<StackInstallation>, StackError> {
        self.init()?;
        let installer = Installer::new(&self.layout, fetcher);

        let php = installer.install_php(&versions.php)?;
        let apache = installer.install_apache(&versions.apache, &php.install_dir)?;
        let mysql = installer.install_mariadb(&versions.mysql)?;
        installer.install_tools()?;

        installer.record_active(&[
            (ServiceKind::Php, versions.php.as_str()),
            (ServiceKind::Apache, versions.apache.as_str()),
            (ServiceKind::MariaDb, versions.mysql.as_str()),
        ])?;
        Ok(vec![php, apache, mysql])
    }

    /// Installs one additional runtime version. The active selection is left
    /// unchanged.
    pub fn php_install(
        &self,
        fetcher: &dyn Fetcher,
        version: &str,
    ) -> Result<StackInstallation, StackError> {
        self.init()?;
        Installer::new(&self.layout, fetcher).install_php(version)
    }

    /// Removes every installed artifact, the settings file, and its lock.
    pub fn uninstall(&self) -> Result<(), StackError> {
        let running = self.running_services()?;
        if !running.is_empty() {
            return Err(StackError::ServicesRunning { services: running });
        }

        let certs = CertTool::new(self.layout.mkcert_path());
        if certs.is_present() {
            certs.uninstall_ca()?;
        }

        info!("Removing stack contents from {:?}", self.layout.root());
        for dir in [self.layout.bin_dir(), self.layout.tmp_dir(), self.layout.www_dir()] {
            remove_if_present(&dir, |path| fs::remove_dir_all(path))?;
        }
        let config_path = self.layout.config_path();
        for file in [config::lock_path_for(&config_path), config_path] {
            remove_if_present(&file, |path| fs::remove_file(path))?;
        }
        Ok(())
    }

    /// Services whose registry entry refers to a live process.
    pub fn running_services(&self) -> Result<Vec<String>, StackError> {
        let registry = PidRegistry::new(self.layout.registry_dir());
        let mut running = Vec::new();
        for name in registry.services()? {
            match registry.read(&name) {
                Ok(Some(RegistryEntry::Pid(pid))) if registry::is_alive(pid) => running.push(name),
                Ok(Some(RegistryEntry::Claimed)) => running.push(name),
                Ok(_) => {}
                Err(err) => warn!("Ignoring unreadable registry entry '{name}': {err}"),
            }
        }
        Ok(running)
    }

    /// Active versions from `wamp.ini`.
    pub fn active(&self) -> Result<ActiveVersions, StackError> {
        Ok(ActiveVersions::load(&self.layout.config_path())?)
    }

    /// Install directory of the active version of `kind`.
    fn active_install_dir(&self, kind: ServiceKind) -> Result<PathBuf, StackError> {
        let active = self.active()?;
        let version = active
            .version(kind)
            .map(str::to_string)
            .unwrap_or_else(|| default_version(kind).to_string());
        let dir = self.layout.install_dir(kind, &version);
        if !dir.is_dir() {
            return Err(StackError::NotInstalled {
                kind,
                version,
                path: dir,
            });
        }
        info!("Using {kind} {version}");
        Ok(dir)
    }

    /// Supervisor for the active version of `kind`.
    pub fn service(&self, kind: ServiceKind) -> Result<ServiceManager, StackError> {
        let install_dir = self.active_install_dir(kind)?;
        let binary = kind
            .server_binary()
            .ok_or_else(|| StackError::MissingComponent {
                what: format!("{kind} server binary"),
                path: install_dir.join("bin"),
            })?;
        let args: &[&str] = match kind {
            ServiceKind::MariaDb => MARIADB_START_ARGS,
            _ => &[],
        };

        Ok(ServiceManager::new(
            kind.to_string(),
            install_dir.join("bin").join(binary),
            args.iter().copied(),
            self.layout.registry_dir(),
        ))
    }

    pub fn start(&self, kind: ServiceKind) -> Result<ServiceProcess, StackError> {
        self.service(kind)?.start()
    }

    pub fn stop(&self, kind: ServiceKind) -> Result<(), StackError> {
        self.service(kind)?.stop()
    }

    pub fn status(&self, kind: ServiceKind) -> Result<ServiceStatus, StackError> {
        self.service(kind)?.status()
    }

    /// Runtime directory for a new site: first install matching `keyword`,
    /// else the active runtime, else the default one.
    pub fn resolve_php(&self, keyword: Option<&str>) -> Result<PathBuf, StackError> {
        let php_root = self.layout.service_dir(ServiceKind::Php);
        if let Some(keyword) = keyword {
            return php::find_runtime(&php_root, keyword)?.ok_or_else(|| {
                StackError::RuntimeMissing {
                    path: php_root.join(keyword),
                }
            });
        }

        let version = self
            .active()?
            .php
            .unwrap_or_else(|| default_version(ServiceKind::Php).to_string());
        Ok(php_root.join(version))
    }

    fn sites(&self) -> Result<SiteProvisioner, StackError> {
        let apache_dir = self.active_install_dir(ServiceKind::Apache)?;
        Ok(SiteProvisioner::new(&self.layout, apache_dir))
    }

    pub fn site_add(
        &self,
        name: &str,
        php: Option<&str>,
        tls: bool,
    ) -> Result<SiteDefinition, StackError> {
        let sites = self.sites()?;
        let php_dir = self.resolve_php(php)?;
        sites.add(name, &php_dir, tls)
    }

    pub fn site_rm(&self, name: &str) -> Result<(), StackError> {
        self.sites()?.remove(name)
    }
}

fn default_version(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Php => DEFAULT_PHP_VERSION,
        ServiceKind::Apache => DEFAULT_APACHE_VERSION,
        ServiceKind::MariaDb => DEFAULT_MARIADB_VERSION,
    }
}

fn remove_if_present(path: &Path, remove: fn(&Path) -> io::Result<()>) -> Result<(), StackError> {
    match remove(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StackError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
