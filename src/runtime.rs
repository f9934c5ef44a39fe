//! Runtime paths for a stack directory.
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    constants::{
        CONFIG_FILE_NAME, STAGING_DIR_NAME, ServiceKind, hostsrw_file_name,
        mkcert_file_name,
    },
    error::StackError,
};

/// Environment variable that overrides the stack root.
pub const ROOT_ENV_VAR: &str = "WAMP_HOME";

/// Every directory the engine reads or writes, derived from one root.
///
/// Built once per invocation and handed to each workflow, so no path state
/// is shared through globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLayout {
    root: PathBuf,
}

impl StackLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the stack root: explicit override first, then the directory
    /// holding the running executable.
    pub fn resolve(root_override: Option<&Path>) -> Result<Self, StackError> {
        if let Some(root) = root_override {
            let root = if root.is_absolute() {
                root.to_path_buf()
            } else {
                let cwd = env::current_dir().map_err(StackError::io("."))?;
                cwd.join(root)
            };
            return Ok(Self::new(root));
        }

        let exe = env::current_exe().map_err(StackError::io("<current executable>"))?;
        let root = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(root))
    }

    /// The stack root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/bin`.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Directory holding every installed version of `kind`.
    pub fn service_dir(&self, kind: ServiceKind) -> PathBuf {
        self.bin_dir().join(kind.to_string())
    }

    /// Install directory of one version of `kind`.
    pub fn install_dir(&self, kind: ServiceKind, version: &str) -> PathBuf {
        self.service_dir(kind).join(version)
    }

    /// Auxiliary tools directory.
    pub fn etc_dir(&self) -> PathBuf {
        self.bin_dir().join("etc")
    }

    /// Certificate tool path.
    pub fn mkcert_path(&self) -> PathBuf {
        self.etc_dir().join(mkcert_file_name())
    }

    /// Hosts-file editor path.
    pub fn hostsrw_path(&self) -> PathBuf {
        self.etc_dir().join(hostsrw_file_name())
    }

    /// Parent of every site document root.
    pub fn www_dir(&self) -> PathBuf {
        self.root.join("www")
    }

    /// Downloads, PID registry, and service logs.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// PID registry directory.
    pub fn registry_dir(&self) -> PathBuf {
        self.tmp_dir()
    }

    /// Where install pipelines assemble bundles before committing them.
    pub fn staging_dir(&self) -> PathBuf {
        self.tmp_dir().join(STAGING_DIR_NAME)
    }

    /// Persisted stack settings.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Directories created by `wamp init`, parents first.
    pub fn skeleton(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.bin_dir(),
            self.service_dir(ServiceKind::Apache),
            self.service_dir(ServiceKind::Php),
            self.service_dir(ServiceKind::MariaDb),
            self.etc_dir(),
            self.www_dir(),
            self.tmp_dir(),
        ]
    }
}

/// Paths inside one web server install.
#[derive(Debug, Clone)]
pub struct ApacheLayout {
    root: PathBuf,
}

impl ApacheLayout {
    /// Wraps an apache install directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Install directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Main server configuration.
    pub fn httpd_conf(&self) -> PathBuf {
        self.root.join("conf").join("httpd.conf")
    }

    /// `conf/extra`.
    pub fn extra_dir(&self) -> PathBuf {
        self.root.join("conf").join("extra")
    }

    /// Per-site vhost fragments.
    pub fn sites_enabled_dir(&self) -> PathBuf {
        self.root.join("conf").join("sites-enabled")
    }

    /// Per-site certificate material.
    pub fn sites_ssl_dir(&self) -> PathBuf {
        self.root.join("conf").join("sites-ssl")
    }

    /// Loadable modules.
    pub fn modules_dir(&self) -> PathBuf {
        self.root.join("modules")
    }

    /// Server logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Vhost fragment of `site`.
    pub fn site_fragment(&self, site: &str) -> PathBuf {
        self.sites_enabled_dir().join(format!("{site}.conf"))
    }

    /// Certificate of `site`.
    pub fn site_cert(&self, site: &str) -> PathBuf {
        self.sites_ssl_dir().join(format!("{site}.pem"))
    }

    /// Private key of `site`.
    pub fn site_key(&self, site: &str) -> PathBuf {
        self.sites_ssl_dir().join(format!("{site}-key.pem"))
    }

    /// Access log of `site`.
    pub fn site_access_log(&self, site: &str) -> PathBuf {
        self.logs_dir().join(format!("{site}-access.log"))
    }

    /// Error log of `site`.
    pub fn site_error_log(&self, site: &str) -> PathBuf {
        self.logs_dir().join(format!("{site}-error.log"))
    }
}
