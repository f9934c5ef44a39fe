//! Persisted stack settings (`wamp.ini`).
//!
//! A small sectioned key/value file. Each service section records the version
//! the `apache`, `mysql`, and `site` commands operate on:
//!
//! ```text
//! [apache]
//! active=httpd-2.4.65-250724-Win64-VS17
//! [mysql]
//! active=mariadb-11.8.3-winx64
//! ```
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    constants::{ACTIVE_KEY, CONFIG_LOCK_SUFFIX, ServiceKind},
    error::ConfigError,
};

/// In-memory view of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl StackConfig {
    /// Parses settings from text. Blank lines, `;`/`#` comments, and keys
    /// outside any section are ignored.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        let mut current: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim().to_string();
                config.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            if let Some((key, value)) = line.split_once('=')
                && let Some(section) = &current
            {
                config
                    .sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        config
    }

    /// Loads settings from `path`. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Access {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Loads settings from `path`, treating a missing file as empty.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Access {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Returns the value stored under `section`/`key`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    /// Inserts or replaces a value, creating the section when needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Renders the settings with sections and keys in sorted order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (section, entries) in &self.sections {
            out.push_str(&format!("[{section}]\n"));
            for (key, value) in entries {
                out.push_str(&format!("{key}={value}\n"));
            }
            out.push('\n');
        }
        out
    }

    /// Writes the settings to `path` through a sibling temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let access = |source| ConfigError::Access {
            path: path.to_path_buf(),
            source,
        };
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(access)?;

        let mut staged = NamedTempFile::new_in(parent).map_err(access)?;
        staged.write_all(self.render().as_bytes()).map_err(access)?;
        staged.as_file().sync_all().map_err(access)?;
        staged.persist(path).map_err(|err| access(err.error))?;
        Ok(())
    }

    /// Runs a read-modify-write cycle on `path` while holding an exclusive
    /// advisory lock on its `.lock` sibling.
    pub fn update<F>(path: &Path, mutate: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut StackConfig),
    {
        let lock_path = lock_path_for(path);
        let access = |source| ConfigError::Access {
            path: lock_path.clone(),
            source,
        };
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(access)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(access)?;
        lock.lock_exclusive().map_err(access)?;
        debug!("Acquired settings lock {:?}", lock_path);

        let result = (|| -> Result<Self, ConfigError> {
            let mut config = Self::load_or_default(path)?;
            mutate(&mut config);
            config.save(path)?;
            Ok(config)
        })();

        let _ = FileExt::unlock(&lock);
        result
    }
}

/// Advisory lock file guarding updates of the settings file at `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(CONFIG_LOCK_SUFFIX);
    path.with_file_name(name)
}

/// Versions the service commands operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVersions {
    /// Selected web server install.
    pub apache: String,
    /// Selected database install.
    pub mysql: String,
    /// Selected scripting runtime, if one was recorded.
    pub php: Option<String>,
}

impl ActiveVersions {
    /// Reads the active selections. Web server and database are required.
    pub fn from_config(config: &StackConfig) -> Result<Self, ConfigError> {
        let required = |kind: ServiceKind| {
            let section = kind.to_string();
            config
                .get(&section, ACTIVE_KEY)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingKey {
                    section,
                    key: ACTIVE_KEY.to_string(),
                })
        };

        Ok(Self {
            apache: required(ServiceKind::Apache)?,
            mysql: required(ServiceKind::MariaDb)?,
            php: config
                .get(&ServiceKind::Php.to_string(), ACTIVE_KEY)
                .map(str::to_string),
        })
    }

    /// Loads the settings file and reads the active selections.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_config(&StackConfig::load(path)?)
    }

    /// Active version for `kind`.
    pub fn version(&self, kind: ServiceKind) -> Option<&str> {
        match kind {
            ServiceKind::Apache => Some(&self.apache),
            ServiceKind::MariaDb => Some(&self.mysql),
            ServiceKind::Php => self.php.as_deref(),
        }
    }
}
