//! Web server bundle and its FastCGI bridge.
use std::{fs, path::Path};

use tracing::{info, warn};

use super::{Bundle, Installer, StackInstallation, remove_dir_if_present};
use crate::{
    archive,
    constants::{
        APACHE_ARCHIVE_WRAPPER, APACHE_DOWNLOAD_BASE, APACHE_MODULE_DOWNLOAD_BASE,
        DEFAULT_SERVER_NAME, FCGID_LOAD_BLOCK, FCGID_MODULE_FILE, FCGID_VERSION,
        REQUIRED_MODULES, SSL_CONF_INCLUDE, STOCK_SERVER_NAME, ServiceKind,
    },
    error::StackError,
    patch::{self, Directive},
    runtime::ApacheLayout,
    templates::{self, normalize},
};

/// Archive of web server `version`.
pub fn bundle(version: &str) -> Bundle {
    Bundle {
        kind: ServiceKind::Apache,
        version: version.to_string(),
        url: format!("{APACHE_DOWNLOAD_BASE}/{version}.zip"),
        wrapper: Some(APACHE_ARCHIVE_WRAPPER.to_string()),
    }
}

/// Archive holding the FastCGI bridge module.
pub fn fcgid_bundle() -> Bundle {
    Bundle {
        kind: ServiceKind::Apache,
        version: FCGID_VERSION.to_string(),
        url: format!("{APACHE_MODULE_DOWNLOAD_BASE}/{FCGID_VERSION}.zip"),
        wrapper: None,
    }
}

/// Edits applied to the stock `httpd.conf`, in order.
pub fn directives(final_dir: &Path) -> Vec<Directive> {
    let mut directives = vec![
        Directive::new(
            "srvroot",
            "Define SRVROOT",
            3,
            format!("Define SRVROOT \"{}\"", normalize(final_dir)),
        ),
        Directive::new(
            "servername",
            &format!("#ServerName {STOCK_SERVER_NAME}"),
            2,
            format!("ServerName {DEFAULT_SERVER_NAME}"),
        ),
        Directive::new(
            "ssl",
            &format!("#Include {SSL_CONF_INCLUDE}"),
            2,
            format!("Include {SSL_CONF_INCLUDE}"),
        ),
    ];

    directives.extend(REQUIRED_MODULES.iter().map(|(module, file)| {
        Directive::new(
            *module,
            &format!("#LoadModule {module}"),
            3,
            format!("LoadModule {module} modules/{file}"),
        )
    }));
    directives
}

impl Installer<'_> {
    /// Installs web server `version`, wiring it to the runtime in `php_dir`.
    pub fn install_apache(
        &self,
        version: &str,
        php_dir: &Path,
    ) -> Result<StackInstallation, StackError> {
        self.install(
            &bundle(version),
            Box::new(move |staging: &Path, final_dir: &Path| {
                self.place_fcgid_module(staging)?;
                configure(staging, final_dir, php_dir)
            }),
        )
    }

    /// Downloads the FastCGI bridge and moves its module into
    /// `<staging>/modules`.
    fn place_fcgid_module(&self, staging: &Path) -> Result<(), StackError> {
        let bundle = fcgid_bundle();
        let archive_path = self.fetch_archive(&bundle)?;
        let unpack_dir = self.layout().staging_dir().join(&bundle.version);

        let result = (|| -> Result<(), StackError> {
            remove_dir_if_present(&unpack_dir).map_err(StackError::io(&unpack_dir))?;
            archive::extract(&archive_path, &unpack_dir)?;

            let module = unpack_dir.join(FCGID_MODULE_FILE);
            if !module.is_file() {
                return Err(StackError::MissingComponent {
                    what: FCGID_MODULE_FILE.to_string(),
                    path: module,
                });
            }

            let modules_dir = ApacheLayout::new(staging).modules_dir();
            fs::create_dir_all(&modules_dir).map_err(StackError::io(&modules_dir))?;
            let target = modules_dir.join(FCGID_MODULE_FILE);
            fs::rename(&module, &target).map_err(StackError::io(&target))?;
            Ok(())
        })();

        if let Err(err) = remove_dir_if_present(&unpack_dir) {
            warn!("Failed to remove unpacked module archive {:?}: {err}", unpack_dir);
        }
        result?;
        fs::remove_file(&archive_path).map_err(StackError::io(&archive_path))?;
        info!("Placed {FCGID_MODULE_FILE}");
        Ok(())
    }
}

/// Writes the bundled config files and patches `httpd.conf`.
pub fn configure(staging: &Path, final_dir: &Path, php_dir: &Path) -> Result<(), StackError> {
    let staged = ApacheLayout::new(staging);
    let installed = ApacheLayout::new(final_dir);
    let httpd_conf = staged.httpd_conf();
    if !httpd_conf.is_file() {
        return Err(StackError::MissingComponent {
            what: "httpd.conf".to_string(),
            path: httpd_conf,
        });
    }

    let extra = staged.extra_dir();
    fs::create_dir_all(&extra).map_err(StackError::io(&extra))?;
    let fcgid_conf = extra.join("httpd-fcgid.conf");
    fs::write(&fcgid_conf, templates::fcgid_conf(php_dir)).map_err(StackError::io(&fcgid_conf))?;
    let ssl_conf = extra.join("httpd-ssl.conf");
    fs::write(&ssl_conf, templates::SSL_CONF).map_err(StackError::io(&ssl_conf))?;

    let changed = patch::apply_directives(&httpd_conf, &directives(final_dir))?;
    info!("Patched {changed} lines in httpd.conf");
    patch::append_block(&httpd_conf, FCGID_LOAD_BLOCK)?;

    for dir in [staged.sites_enabled_dir(), staged.sites_ssl_dir(), staged.logs_dir()] {
        fs::create_dir_all(&dir).map_err(StackError::io(&dir))?;
    }
    patch::append_block(
        &httpd_conf,
        &templates::include_sites(&installed.sites_enabled_dir()),
    )?;
    Ok(())
}
