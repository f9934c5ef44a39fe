//! wamp installs, runs, and provisions a local web development stack made of
//! Apache httpd, MariaDB, and PHP. It downloads and patches each bundled
//! service into a self-contained directory, supervises the server processes
//! through a file-based PID registry, and creates per-site virtual hosts with
//! optional locally-trusted TLS.

/// Archive extraction.
pub mod archive;

/// CLI interface.
pub mod cli;

/// Persisted stack settings.
pub mod config;

/// Shared names and defaults.
pub mod constants;

/// Artifact downloads.
pub mod download;

/// Error handling.
pub mod error;

/// Staged install pipelines.
pub mod install;

/// Config file patching.
pub mod patch;

/// Service process supervision.
pub mod process;

/// PID registry.
pub mod registry;

/// Stack directory layout.
pub mod runtime;

/// Site provisioning.
pub mod site;

/// Top-level stack operations.
pub mod stack;

/// Generated configuration files.
pub mod templates;

/// External tool wrappers.
pub mod tools;
