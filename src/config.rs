use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::dhcp::DhcpConfig;
use crate::smoke::SuiteKind;

mod defaults;
mod validation;

const DEFAULT_CONFIG_FILE: &str = "argus.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub argus: ArgusSettings,
    pub cloudbaseinit: CloudbaseinitSettings,
    pub dhcp: DhcpSettings,
    #[serde(default)]
    pub images: BTreeMap<String, ImageSettings>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArgusSettings {
    /// Directory holding bundled userdata payloads.
    pub resources: PathBuf,
    pub debug: bool,
    #[serde(default)]
    pub file_log: Option<PathBuf>,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Where console output of each instance is archived, if anywhere.
    #[serde(default)]
    pub instance_output: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloudbaseinitSettings {
    pub expected_plugins_count: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DhcpSettings {
    pub agent_config: PathBuf,
    pub dnsmasq_config: PathBuf,
}

impl DhcpSettings {
    #[must_use]
    pub fn reader(&self) -> DhcpConfig {
        DhcpConfig::new(self.agent_config.clone(), self.dnsmasq_config.clone())
    }
}

/// Expected properties of the image an instance boots from.
#[derive(Debug, Deserialize, Clone)]
pub struct ImageSettings {
    /// Filled from the `[images.<name>]` table key.
    #[serde(skip)]
    pub name: String,
    #[serde(default = "defaults::default_ci_username")]
    pub default_ci_username: String,
    #[serde(default = "defaults::default_ci_password")]
    pub default_ci_password: String,
    pub image_ref: String,
    #[serde(default)]
    pub flavor_ref: String,
    pub group: String,
    pub created_user: String,
    #[serde(default = "defaults::default_os_type")]
    pub os_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScenarioSettings {
    pub test_classes: Vec<SuiteKind>,
    pub recipe: String,
    #[serde(default)]
    pub userdata: Option<String>,
    #[serde(default = "defaults::default_metadata")]
    pub metadata: String,
    pub image: String,
    #[serde(default, rename = "type")]
    pub scenario_type: Option<String>,
    #[serde(default = "defaults::default_service_type")]
    pub service_type: String,
    #[serde(default = "defaults::default_is_enabled")]
    pub is_enabled: bool,
}

impl Settings {
    /// Loads settings from defaults, the config file and `ARGUS_*` variables.
    ///
    /// # Errors
    /// Returns error if configuration parsing fails (e.g. invalid format).
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut s = defaults::apply_defaults(Config::builder())?;

        // A missing file is fine; everything has a default.
        let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        s = s.add_source(File::from(path).required(false));

        // e.g. ARGUS_CLOUDBASEINIT__EXPECTED_PLUGINS_COUNT=14
        s = s.add_source(
            Environment::with_prefix("ARGUS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = s.build()?.try_deserialize()?;
        for (name, image) in &mut settings.images {
            name.clone_into(&mut image.name);
        }
        Ok(settings)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Errors
    /// Returns error if a value is empty or a scenario references an
    /// unknown image.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }
}
