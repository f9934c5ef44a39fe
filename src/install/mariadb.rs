//! Database engine bundle.
use std::{fs, path::Path};

use tracing::info;

use super::{Bundle, Installer, StackInstallation};
use crate::{
    constants::{MARIADB_DOWNLOAD_BASE, ServiceKind, mariadb_install_db_binary},
    error::StackError,
    templates::normalize,
    tools::run_tool,
};

/// Archive of database `version`. Vendor archives wrap their contents in a
/// directory named after the version.
pub fn bundle(version: &str) -> Bundle {
    Bundle {
        kind: ServiceKind::MariaDb,
        version: version.to_string(),
        url: format!("{MARIADB_DOWNLOAD_BASE}/{}/{version}.zip", release_of(version)),
        wrapper: Some(version.to_string()),
    }
}

/// Release number embedded in a version name such as `mariadb-11.8.3-winx64`.
fn release_of(version: &str) -> &str {
    version
        .split('-')
        .find(|part| part.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(version)
}

/// `my.ini` contents for an install at `final_dir`.
pub fn my_ini(final_dir: &Path) -> String {
    format!(
        "[mysqld]\nbasedir={}\ndatadir={}\n",
        normalize(final_dir),
        normalize(&final_dir.join("data"))
    )
}

/// Creates the data directory, writes `my.ini`, and initializes the system
/// tables.
pub fn configure(staging: &Path, final_dir: &Path) -> Result<(), StackError> {
    let data = staging.join("data");
    fs::create_dir_all(&data).map_err(StackError::io(&data))?;

    let ini = staging.join("my.ini");
    fs::write(&ini, my_ini(final_dir)).map_err(StackError::io(&ini))?;

    let install_db = staging.join("bin").join(mariadb_install_db_binary());
    let basedir = format!("--basedir={}", staging.display());
    let datadir = format!("--datadir={}", data.display());
    info!("Initializing database in {:?}", data);
    run_tool(&install_db, &[&basedir, &datadir], Some(staging))?;
    Ok(())
}

impl Installer<'_> {
    /// Installs database `version`.
    pub fn install_mariadb(&self, version: &str) -> Result<StackInstallation, StackError> {
        self.install(&bundle(version), Box::new(configure))
    }
}
