use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Transport used to reach the instance's remote management endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// An authenticated command channel into the instance.
///
/// Implementations own their connection handling and retry policy.
pub trait RemoteClient {
    /// Runs `command` on the instance and returns its stdout verbatim.
    ///
    /// # Errors
    /// Returns an error when the command cannot be executed.
    fn run_command_verbose(&self, command: &str) -> Result<String>;

    /// Copies a local file to `remote_path` on the instance.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or transferred.
    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;
}
