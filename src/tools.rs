//! Wrappers around the auxiliary command-line tools the stack ships with.
use std::{
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use tracing::{debug, info};

use crate::{
    constants::{MKCERT_INSTALL_ARG, MKCERT_UNINSTALL_ARG},
    error::StackError,
};

/// Runs `program` to completion, capturing its output.
///
/// A non-zero exit becomes [`StackError::Subprocess`] carrying stderr (or
/// stdout when stderr is empty).
pub fn run_tool(program: &Path, args: &[&str], cwd: Option<&Path>) -> Result<Output, StackError> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!("Executing command: {cmd:?}");

    let output = cmd.output().map_err(|source| StackError::Spawn {
        program: program.display().to_string(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostic = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(StackError::Subprocess {
            program: program.display().to_string(),
            code: output.status.code(),
            output: diagnostic,
        });
    }

    Ok(output)
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Local certificate authority tool (`mkcert`).
#[derive(Debug, Clone)]
pub struct CertTool {
    binary: PathBuf,
}

impl CertTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether the tool has been installed.
    pub fn is_present(&self) -> bool {
        self.binary.is_file()
    }

    /// Registers the local CA with the system trust stores.
    pub fn install_ca(&self) -> Result<(), StackError> {
        run_tool(&self.binary, &[MKCERT_INSTALL_ARG], None)?;
        info!("Installed local certificate authority");
        Ok(())
    }

    /// Removes the local CA from the system trust stores.
    pub fn uninstall_ca(&self) -> Result<(), StackError> {
        run_tool(&self.binary, &[MKCERT_UNINSTALL_ARG], None)?;
        info!("Removed local certificate authority");
        Ok(())
    }

    /// Issues `<site>.pem` and `<site>-key.pem` into `dir`.
    pub fn issue(&self, site: &str, dir: &Path) -> Result<(), StackError> {
        run_tool(&self.binary, &[site], Some(dir))?;
        Ok(())
    }
}

/// Hosts-file editor (`hostsrw`).
#[derive(Debug, Clone)]
pub struct HostsEditor {
    binary: PathBuf,
}

impl HostsEditor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Adds `site` unless it is already registered.
    ///
    /// `exists` prints the matching entry when the name is registered.
    pub fn register(&self, site: &str) -> Result<(), StackError> {
        let existing = stdout_text(&run_tool(&self.binary, &["exists", site], None)?);
        if !existing.is_empty() {
            return Err(StackError::Subprocess {
                program: self.binary.display().to_string(),
                code: Some(0),
                output: format!("'{site}' is already registered in the hosts file"),
            });
        }

        run_tool(&self.binary, &["add", site], None)?;
        Ok(())
    }

    /// Removes `site`. Any output from `rm` is an error report.
    pub fn unregister(&self, site: &str) -> Result<(), StackError> {
        let report = stdout_text(&run_tool(&self.binary, &["rm", site], None)?);
        if !report.is_empty() {
            return Err(StackError::Subprocess {
                program: self.binary.display().to_string(),
                code: Some(0),
                output: report,
            });
        }
        Ok(())
    }
}
