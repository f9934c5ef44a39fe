//! Auxiliary tools: certificate tool, hosts-file editor, dependency manager.
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use super::{Installer, ToolBundle, remove_dir_if_present};
use crate::{
    constants::{
        COMPOSER_FILE_NAME, COMPOSER_URL, HOSTSRW_URL, MKCERT_URL, TOOLS_STAGING_NAME,
        hostsrw_file_name, mkcert_file_name,
    },
    download,
    error::StackError,
    tools::CertTool,
};

/// Tools installed into `bin/etc`, certificate tool first.
pub fn bundles() -> Vec<ToolBundle> {
    vec![
        ToolBundle {
            file_name: mkcert_file_name(),
            url: MKCERT_URL.to_string(),
            executable: true,
        },
        ToolBundle {
            file_name: hostsrw_file_name(),
            url: HOSTSRW_URL.to_string(),
            executable: true,
        },
        ToolBundle {
            file_name: COMPOSER_FILE_NAME.to_string(),
            url: COMPOSER_URL.to_string(),
            executable: false,
        },
    ]
}

impl Installer<'_> {
    /// Installs every auxiliary tool and registers the local CA.
    pub fn install_tools(&self) -> Result<(), StackError> {
        self.install_tool_set(&bundles())
    }

    /// Installs `tools` into `bin/etc`. Refuses when the certificate tool is
    /// already present.
    ///
    /// Every tool is downloaded and staged, and the local CA registered from
    /// the staged certificate tool, before anything lands in `bin/etc`. A
    /// failure leaves `bin/etc` untouched and keeps the downloads cached.
    pub fn install_tool_set(&self, tools: &[ToolBundle]) -> Result<(), StackError> {
        let layout = self.layout();
        let mkcert = layout.mkcert_path();
        if mkcert.exists() {
            return Err(StackError::ToolsInstalled { path: mkcert });
        }

        let mut downloads = Vec::with_capacity(tools.len());
        for tool in tools {
            let downloaded = layout.tmp_dir().join(&tool.file_name);
            download::download_if_missing(self.fetcher(), &tool.url, &downloaded)?;
            downloads.push(downloaded);
        }

        let staging = layout.staging_dir().join(TOOLS_STAGING_NAME);
        let staged = stage_tools(tools, &downloads, &staging).and_then(|()| {
            let staged_mkcert = staging.join(mkcert_file_name());
            CertTool::new(&staged_mkcert).install_ca()
        });
        if let Err(err) = staged {
            if let Err(cleanup) = remove_dir_if_present(&staging) {
                warn!("Failed to remove staging directory {:?}: {cleanup}", staging);
            }
            return Err(err);
        }

        let etc = layout.etc_dir();
        fs::create_dir_all(&etc).map_err(StackError::io(&etc))?;
        // The certificate tool marks the set as installed, so it moves last.
        let mut order: Vec<&ToolBundle> = tools.iter().collect();
        order.sort_by_key(|tool| tool.file_name == mkcert_file_name());
        for tool in order {
            let target = etc.join(&tool.file_name);
            fs::rename(staging.join(&tool.file_name), &target).map_err(StackError::io(&target))?;
            info!("Installed {}", tool.file_name);
        }

        if let Err(err) = remove_dir_if_present(&staging) {
            warn!("Failed to remove staging directory {:?}: {err}", staging);
        }
        for downloaded in downloads {
            if let Err(err) = fs::remove_file(&downloaded) {
                warn!("Failed to remove downloaded tool {:?}: {err}", downloaded);
            }
        }
        Ok(())
    }
}

/// Copies each download into a fresh `staging` directory.
fn stage_tools(
    tools: &[ToolBundle],
    downloads: &[PathBuf],
    staging: &Path,
) -> Result<(), StackError> {
    remove_dir_if_present(staging).map_err(StackError::io(staging))?;
    fs::create_dir_all(staging).map_err(StackError::io(staging))?;

    for (tool, downloaded) in tools.iter().zip(downloads) {
        let target = staging.join(&tool.file_name);
        fs::copy(downloaded, &target).map_err(StackError::io(&target))?;
        if tool.executable {
            mark_executable(&target)?;
        }
        debug!("Staged {} at {:?}", tool.file_name, target);
    }
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), StackError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .map_err(StackError::io(path))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions).map_err(StackError::io(path))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), StackError> {
    Ok(())
}
