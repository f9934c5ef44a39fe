//! Virtual host provisioning.
//!
//! A site spans four places: its document root under `www/`, a vhost
//! fragment in the web server's `conf/sites-enabled`, an optional
//! certificate pair in `conf/sites-ssl`, and an entry in the OS hosts file.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use regex::Regex;
use tracing::{info, warn};

use crate::{
    constants::LOOPBACK_ADDRESS,
    error::StackError,
    patch,
    runtime::{ApacheLayout, StackLayout},
    templates::{self, TlsFiles},
    tools::{CertTool, HostsEditor},
};

const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";

/// Rejects names that are not dotted hostnames.
pub fn validate_site_name(name: &str) -> Result<(), StackError> {
    let invalid = || StackError::InvalidSiteName(name.to_string());
    let pattern = Regex::new(HOSTNAME_PATTERN).map_err(|_| invalid())?;
    if name.len() > 253 || !pattern.is_match(name) {
        return Err(invalid());
    }
    Ok(())
}

/// Certificate pair of a TLS-enabled site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// A provisioned virtual host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDefinition {
    pub name: String,
    pub doc_root: PathBuf,
    pub php_dir: PathBuf,
    pub fragment: PathBuf,
    pub tls: Option<TlsMaterial>,
}

impl SiteDefinition {
    /// Renders the vhost fragment for this site.
    pub fn render(&self) -> String {
        templates::vhost(
            &self.doc_root,
            &self.name,
            &self.php_dir,
            self.tls.as_ref().map(|tls| TlsFiles {
                cert: &tls.cert,
                key: &tls.key,
            }),
        )
    }
}

/// Adds and removes sites on one web server install.
#[derive(Debug, Clone)]
pub struct SiteProvisioner {
    www_dir: PathBuf,
    apache: ApacheLayout,
    certs: CertTool,
    hosts: HostsEditor,
}

impl SiteProvisioner {
    /// Provisioner for the web server installed at `apache_dir`.
    pub fn new(layout: &StackLayout, apache_dir: impl Into<PathBuf>) -> Self {
        Self {
            www_dir: layout.www_dir(),
            apache: ApacheLayout::new(apache_dir),
            certs: CertTool::new(layout.mkcert_path()),
            hosts: HostsEditor::new(layout.hostsrw_path()),
        }
    }

    /// Document root of `site`.
    pub fn doc_root(&self, site: &str) -> PathBuf {
        self.www_dir.join(site)
    }

    /// Creates `site`, bound to the runtime in `php_dir`.
    pub fn add(&self, site: &str, php_dir: &Path, tls: bool) -> Result<SiteDefinition, StackError> {
        validate_site_name(site)?;

        let doc_root = self.doc_root(site);
        let fragment = self.apache.site_fragment(site);
        for existing in [&doc_root, &fragment] {
            if existing.exists() {
                return Err(StackError::SiteExists {
                    site: site.to_string(),
                    path: existing.clone(),
                });
            }
        }

        if !php_dir.is_dir() {
            return Err(StackError::RuntimeMissing {
                path: php_dir.to_path_buf(),
            });
        }

        let tls = if tls {
            let material = TlsMaterial {
                cert: self.apache.site_cert(site),
                key: self.apache.site_key(site),
            };
            for path in [&material.cert, &material.key] {
                if path.exists() {
                    return Err(StackError::CertExists { path: path.clone() });
                }
            }
            Some(material)
        } else {
            None
        };

        let definition = SiteDefinition {
            name: site.to_string(),
            doc_root,
            php_dir: php_dir.to_path_buf(),
            fragment,
            tls,
        };

        self.create_doc_root(&definition)?;
        if let Err(err) = self.write_artifacts(&definition) {
            warn!("Site '{site}' is partially provisioned; run `wamp site rm {site}` to clean up");
            return Err(err);
        }

        info!("Site '{site}' created at {:?}", definition.doc_root);
        self.register_host(site);
        Ok(definition)
    }

    fn create_doc_root(&self, site: &SiteDefinition) -> Result<(), StackError> {
        fs::create_dir_all(&self.www_dir).map_err(StackError::io(&self.www_dir))?;
        match fs::create_dir(&site.doc_root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(StackError::SiteExists {
                site: site.name.clone(),
                path: site.doc_root.clone(),
            }),
            Err(source) => Err(StackError::Io {
                path: site.doc_root.clone(),
                source,
            }),
        }
    }

    fn write_artifacts(&self, site: &SiteDefinition) -> Result<(), StackError> {
        if let Some(tls) = &site.tls {
            let ssl_dir = self.apache.sites_ssl_dir();
            fs::create_dir_all(&ssl_dir).map_err(StackError::io(&ssl_dir))?;
            self.certs.issue(&site.name, &ssl_dir)?;
            for path in [&tls.cert, &tls.key] {
                if !path.is_file() {
                    return Err(StackError::MissingComponent {
                        what: "certificate output".to_string(),
                        path: path.clone(),
                    });
                }
            }
            info!("Issued certificate for '{}'", site.name);
        }

        let sites_enabled = self.apache.sites_enabled_dir();
        fs::create_dir_all(&sites_enabled).map_err(StackError::io(&sites_enabled))?;
        match patch::create_file(&site.fragment, &site.render()) {
            Err(StackError::Io { source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => {
                Err(StackError::SiteExists {
                    site: site.name.clone(),
                    path: site.fragment.clone(),
                })
            }
            other => other,
        }
    }

    fn register_host(&self, site: &str) {
        match self.hosts.register(site) {
            Ok(()) => info!("Wrote '{site}' into the hosts file"),
            Err(err) => warn!(
                "Unable to register '{site}' in the hosts file; add '{LOOPBACK_ADDRESS} {site}' manually: {err}"
            ),
        }
    }

    /// Deletes every artifact of `site`. Missing artifacts are skipped, so
    /// removing an absent site succeeds.
    pub fn remove(&self, site: &str) -> Result<(), StackError> {
        validate_site_name(site)?;

        remove_path(&self.doc_root(site), true)?;
        for file in [
            self.apache.site_fragment(site),
            self.apache.site_access_log(site),
            self.apache.site_error_log(site),
            self.apache.site_cert(site),
            self.apache.site_key(site),
        ] {
            remove_path(&file, false)?;
        }
        info!("Site '{site}' removed");

        match self.hosts.unregister(site) {
            Ok(()) => info!("Removed '{site}' from the hosts file"),
            Err(err) => warn!(
                "Unable to remove '{site}' from the hosts file; remove '{LOOPBACK_ADDRESS} {site}' manually: {err}"
            ),
        }
        Ok(())
    }
}

fn remove_path(path: &Path, recursive: bool) -> Result<(), StackError> {
    let result = if recursive {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StackError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
