//! Constants and default values for the wamp stack.
//!
//! This module centralizes the file names, vendor artifacts, and directive
//! values shared by the installer, the supervisor, and the site workflow.

use std::env::consts::EXE_SUFFIX;

use strum_macros::{AsRefStr, Display, EnumString};

// ============================================================================
// Service Kinds
// ============================================================================

/// Bundled services that get their own versioned install directory.
///
/// The string form doubles as the directory name under `bin/` and as the
/// section name in `wamp.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ServiceKind {
    /// Scripting runtime (PHP).
    #[strum(serialize = "php")]
    Php,
    /// Web server (Apache httpd).
    #[strum(serialize = "apache")]
    Apache,
    /// Database engine (MariaDB).
    #[strum(serialize = "mysql")]
    MariaDb,
}

impl ServiceKind {
    /// Name of the long-running server binary, if the kind runs as a service.
    pub fn server_binary(&self) -> Option<String> {
        match self {
            Self::Php => None,
            Self::Apache => Some(format!("httpd{EXE_SUFFIX}")),
            Self::MariaDb => Some(format!("mariadbd{EXE_SUFFIX}")),
        }
    }
}

// ============================================================================
// File System Constants
// ============================================================================

/// Name of the persisted stack settings file at the stack root.
pub const CONFIG_FILE_NAME: &str = "wamp.ini";

/// Lock file suffix guarding read-modify-write cycles of the settings file.
pub const CONFIG_LOCK_SUFFIX: &str = ".lock";

/// Suffix appended to a service name to form its registry file name.
pub const PID_FILE_SUFFIX: &str = "_pid";

/// Suffix appended to a service name to form its output log file name.
pub const SERVICE_LOG_SUFFIX: &str = ".log";

/// Suffix for in-flight downloads.
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = ".tmp";

/// Bytes between two download progress reports.
pub const DOWNLOAD_PROGRESS_STEP: u64 = 5 * 1024 * 1024;

/// Subdirectory of `tmp/` where install pipelines assemble their output.
pub const STAGING_DIR_NAME: &str = "staging";

/// Directory under the staging area where auxiliary tools are assembled.
pub const TOOLS_STAGING_NAME: &str = "etc";

/// Key holding the selected version inside each service section.
pub const ACTIVE_KEY: &str = "active";

// ============================================================================
// Default Bundles
// ============================================================================

/// Default scripting runtime shipped by `wamp install`.
pub const DEFAULT_PHP_VERSION: &str = "php-8.3.8-nts-Win32-vs16-x64";

/// Download location for scripting runtime archives, keyed by version.
pub const PHP_DOWNLOAD_BASE: &str = "https://windows.php.net/downloads/releases/archives";

/// Default web server shipped by `wamp install`.
pub const DEFAULT_APACHE_VERSION: &str = "httpd-2.4.65-250724-Win64-VS17";

/// Download location for web server archives.
pub const APACHE_DOWNLOAD_BASE: &str = "https://www.apachelounge.com/download/VS17/binaries";

/// Directory that wraps every file inside the web server archive.
pub const APACHE_ARCHIVE_WRAPPER: &str = "Apache24";

/// FastCGI bridge module archive.
pub const FCGID_VERSION: &str = "mod_fcgid-2.3.10-win64-VS17";

/// Download location for web server module archives.
pub const APACHE_MODULE_DOWNLOAD_BASE: &str = "https://www.apachelounge.com/download/VS17/modules";

/// Default database engine shipped by `wamp install`.
pub const DEFAULT_MARIADB_VERSION: &str = "mariadb-11.8.3-winx64";

/// Download location for database engine archives.
pub const MARIADB_DOWNLOAD_BASE: &str = "http://downloads.mariadb.org/rest-api/mariadb";

/// Auxiliary certificate tool download.
pub const MKCERT_URL: &str =
    "https://github.com/FiloSottile/mkcert/releases/download/v1.4.4/mkcert-v1.4.4-windows-amd64.exe";

/// Auxiliary hosts-file editor download.
pub const HOSTSRW_URL: &str =
    "https://github.com/aziyan99/hostsrw/releases/download/v2.3.2/hostsrw.exe";

/// Dependency manager download.
pub const COMPOSER_URL: &str = "https://getcomposer.org/download/latest-stable/composer.phar";

/// File name of the certificate tool inside `bin/etc`.
pub fn mkcert_file_name() -> String {
    format!("mkcert{EXE_SUFFIX}")
}

/// File name of the hosts-file editor inside `bin/etc`.
pub fn hostsrw_file_name() -> String {
    format!("hostsrw{EXE_SUFFIX}")
}

/// File name of the dependency manager inside `bin/etc`.
pub const COMPOSER_FILE_NAME: &str = "composer.phar";

/// Database initialization helper, relative to the database install dir.
pub fn mariadb_install_db_binary() -> String {
    format!("mariadb-install-db{EXE_SUFFIX}")
}

/// FastCGI executable shipped with the scripting runtime.
pub fn php_cgi_binary() -> String {
    format!("php-cgi{EXE_SUFFIX}")
}

// ============================================================================
// Web Server Configuration
// ============================================================================

/// Address the web server binds to after installation.
pub const DEFAULT_SERVER_NAME: &str = "127.0.0.1:80";

/// Placeholder `ServerName` value in the stock `httpd.conf`.
pub const STOCK_SERVER_NAME: &str = "www.example.com:80";

/// Relative path of the TLS defaults include.
pub const SSL_CONF_INCLUDE: &str = "conf/extra/httpd-ssl.conf";

/// Modules that must be enabled in `httpd.conf`, as `(module, shared object)`.
pub const REQUIRED_MODULES: &[(&str, &str)] = &[
    ("access_compat_module", "mod_access_compat.so"),
    ("rewrite_module", "mod_rewrite.so"),
    ("socache_shmcb_module", "mod_socache_shmcb.so"),
    ("ssl_module", "mod_ssl.so"),
    ("log_config_module", "mod_log_config.so"),
    ("setenvif_module", "mod_setenvif.so"),
];

/// Block appended to `httpd.conf` to load the FastCGI bridge.
pub const FCGID_LOAD_BLOCK: &str = "\n\n# wamp\nLoadModule fcgid_module modules/mod_fcgid.so\n<IfModule fcgid_module>\nInclude conf/extra/httpd-fcgid.conf\n</IfModule>\n";

/// Shared object name of the FastCGI bridge module.
pub const FCGID_MODULE_FILE: &str = "mod_fcgid.so";

/// Address written to the hosts file for every site.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

// ============================================================================
// Subprocess Arguments
// ============================================================================

/// Extra arguments passed to the database server on start.
pub const MARIADB_START_ARGS: &[&str] = &["--console"];

/// Argument installing the local certificate authority.
pub const MKCERT_INSTALL_ARG: &str = "-install";

/// Argument removing the local certificate authority.
pub const MKCERT_UNINSTALL_ARG: &str = "-uninstall";
