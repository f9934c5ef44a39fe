//! Command-line interface for wamp.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::runtime::ROOT_ENV_VAR;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" | "err" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" | "information" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(format!("invalid log level '{trimmed}'")),
        };

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for wamp.
#[derive(Parser, Debug)]
#[command(name = "wamp", version, author)]
#[command(about = "Install, run, and provision a local Apache/MariaDB/PHP stack", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Stack directory (defaults to the directory holding the executable).
    #[arg(long, value_name = "DIR", global = true, env = ROOT_ENV_VAR)]
    pub root: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for wamp.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the stack directory layout.
    Init,

    /// Download and configure PHP, Apache, MariaDB, and the helper tools.
    Install,

    /// Remove every installed service, site, and setting.
    Uninstall,

    /// Control the web server.
    Apache {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Control the database server.
    Mysql {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Manage virtual hosts.
    Site {
        #[command(subcommand)]
        action: SiteAction,
    },

    /// Manage PHP runtimes.
    Php {
        #[command(subcommand)]
        action: PhpAction,
    },
}

/// Lifecycle actions for a supervised service.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    /// Launch the active version in the background.
    Start,

    /// Kill the running instance.
    Stop,

    /// Show whether the service is running.
    Status {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },
}

/// Site management actions.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum SiteAction {
    /// Create a site with its document root and virtual host.
    Add {
        /// PHP runtime to bind, matched against installed version names.
        #[arg(long, value_name = "VERSION")]
        php: Option<String>,

        /// Issue a locally-trusted certificate and serve over HTTPS too.
        #[arg(short, long)]
        ssl: bool,

        /// Hostname of the site, e.g. `example.test`.
        name: String,
    },

    /// Delete a site and everything generated for it.
    Rm {
        /// Hostname of the site.
        name: String,
    },
}

/// PHP runtime actions.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum PhpAction {
    /// Install an additional PHP version, e.g. `php-8.2.20-nts-Win32-vs16-x64`.
    Install {
        /// Release archive name.
        version: String,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
