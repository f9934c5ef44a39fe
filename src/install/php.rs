//! Scripting runtime bundle.
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use super::{Bundle, Installer, StackInstallation};
use crate::{
    constants::{PHP_DOWNLOAD_BASE, ServiceKind},
    error::StackError,
    patch::{self, Directive},
    templates::normalize,
};

/// Archive of runtime `version`.
pub fn bundle(version: &str) -> Bundle {
    Bundle {
        kind: ServiceKind::Php,
        version: version.to_string(),
        url: format!("{PHP_DOWNLOAD_BASE}/{version}.zip"),
        wrapper: None,
    }
}

/// Points `extension_dir` at the runtime's `ext/` directory.
pub fn extension_dir(final_dir: &Path) -> Directive {
    Directive::new(
        "extension_dir",
        ";extension_dir = \"ext\"",
        3,
        format!("extension_dir = \"{}\"", normalize(&final_dir.join("ext"))),
    )
}

/// Creates `php.ini` from the development template and patches it.
pub fn configure(staging: &Path, final_dir: &Path) -> Result<(), StackError> {
    let template = staging.join("php.ini-development");
    let ini = staging.join("php.ini");
    if !template.is_file() {
        return Err(StackError::MissingComponent {
            what: "php.ini-development".to_string(),
            path: template,
        });
    }

    fs::copy(&template, &ini).map_err(StackError::io(&ini))?;
    patch::apply_directive(&ini, &extension_dir(final_dir))?;
    info!("Configured php.ini");
    Ok(())
}

impl Installer<'_> {
    /// Installs runtime `version`.
    pub fn install_php(&self, version: &str) -> Result<StackInstallation, StackError> {
        self.install(&bundle(version), Box::new(configure))
    }
}

/// First installed runtime whose directory name contains `keyword`, in
/// directory-name order.
pub fn find_runtime(php_root: &Path, keyword: &str) -> Result<Option<PathBuf>, StackError> {
    let entries = match fs::read_dir(php_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StackError::Io {
                path: php_root.to_path_buf(),
                source,
            });
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(keyword))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}
