use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing::debug;

pub const DEFAULT_DHCP_AGENT_CONFIG: &str = "/etc/neutron/dhcp_agent.ini";
pub const DEFAULT_DNSMASQ_CONFIG: &str = "/etc/neutron/dnsmasq-neutron.conf";

/// DHCP option carrying the NTP server list.
pub const NTP_SERVERS_OPTION: &str = "42";
/// DHCP option carrying the interface MTU.
pub const MTU_OPTION: &str = "26";

const DNSMASQ_CONFIG_DIRECTIVE: &str = "dnsmasq_config_file";
const DHCP_OPTION_FORCE: &str = "dhcp-option-force";

/// Reads the neutron DHCP agent configuration and its dnsmasq overrides.
///
/// The "is dnsmasq configured" answer is computed once per reader and kept
/// for the reader's lifetime, even if the files change afterwards.
#[derive(Debug)]
pub struct DhcpConfig {
    agent_config: PathBuf,
    dnsmasq_config: PathBuf,
    configured: OnceLock<bool>,
}

impl DhcpConfig {
    #[must_use]
    pub fn new(agent_config: PathBuf, dnsmasq_config: PathBuf) -> Self {
        Self {
            agent_config,
            dnsmasq_config,
            configured: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn agent_config(&self) -> &Path {
        &self.agent_config
    }

    #[must_use]
    pub fn dnsmasq_config(&self) -> &Path {
        &self.dnsmasq_config
    }

    /// Returns true when the agent config points `dnsmasq_config_file` at the
    /// dnsmasq override file. Missing or unreadable agent config means false.
    pub fn is_dnsmasq_configured(&self) -> bool {
        *self.configured.get_or_init(|| {
            let configured = self.scan_agent_config();
            debug!(
                "dnsmasq override detection for {}: {configured}",
                self.agent_config.display()
            );
            configured
        })
    }

    fn scan_agent_config(&self) -> bool {
        let Ok(file) = std::fs::File::open(&self.agent_config) else {
            return false;
        };
        let target = self.dnsmasq_config.to_string_lossy();
        for line in BufReader::new(file).split(b'\n') {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    debug!("Failed to read {}: {err}", self.agent_config.display());
                    return false;
                }
            };
            // Undecodable bytes must not hide later directives.
            let line = String::from_utf8_lossy(&line);
            if !line.starts_with(DNSMASQ_CONFIG_DIRECTIVE) {
                continue;
            }
            let value = line.split_once('=').map_or("", |(_, value)| value);
            if value.trim() == target {
                return true;
            }
        }
        false
    }

    /// Looks up `dhcp-option-force=<key>,<value>` in the dnsmasq file and
    /// returns the trimmed value of the first matching line.
    ///
    /// # Errors
    /// Returns an error if the dnsmasq file cannot be read. Callers that
    /// did not check [`DhcpConfig::is_dnsmasq_configured`] first get this
    /// error instead of a skip.
    pub fn get_dhcp_override(&self, key: &str) -> Result<Option<String>> {
        let file = std::fs::File::open(&self.dnsmasq_config).with_context(|| {
            format!("Failed to open {}", self.dnsmasq_config.display())
        })?;
        let lookup = format!("{DHCP_OPTION_FORCE}={key}");
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| {
                format!("Failed to read {}", self.dnsmasq_config.display())
            })?;
            if !line.starts_with(&lookup) {
                continue;
            }
            let option_value = line.trim().split_once('=').map_or("", |(_, value)| value);
            let value = option_value.split_once(',').map_or("", |(_, value)| value);
            return Ok(Some(value.trim().to_string()));
        }
        Ok(None)
    }
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self::new(
            PathBuf::from(DEFAULT_DHCP_AGENT_CONFIG),
            PathBuf::from(DEFAULT_DNSMASQ_CONFIG),
        )
    }
}
