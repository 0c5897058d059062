use config::{ConfigBuilder, ConfigError, builder::DefaultState};

use crate::dhcp::{DEFAULT_DHCP_AGENT_CONFIG, DEFAULT_DNSMASQ_CONFIG};

const DEFAULT_RESOURCES_DIR: &str = "resources";
const DEFAULT_DEBUG: bool = false;
const DEFAULT_EXPECTED_PLUGINS_COUNT: u64 = 13;
const DEFAULT_CI_USERNAME: &str = "CiAdmin";
const DEFAULT_CI_PASSWORD: &str = "Passw0rd";
const DEFAULT_OS_TYPE: &str = "Windows";
const DEFAULT_SERVICE_TYPE: &str = "http";
const DEFAULT_METADATA: &str = "{}";

pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("argus.resources", DEFAULT_RESOURCES_DIR)?
        .set_default("argus.debug", DEFAULT_DEBUG)?
        .set_default(
            "cloudbaseinit.expected_plugins_count",
            DEFAULT_EXPECTED_PLUGINS_COUNT,
        )?
        .set_default("dhcp.agent_config", DEFAULT_DHCP_AGENT_CONFIG)?
        .set_default("dhcp.dnsmasq_config", DEFAULT_DNSMASQ_CONFIG)
}

pub(crate) fn default_ci_username() -> String {
    DEFAULT_CI_USERNAME.to_string()
}

pub(crate) fn default_ci_password() -> String {
    DEFAULT_CI_PASSWORD.to_string()
}

pub(crate) fn default_os_type() -> String {
    DEFAULT_OS_TYPE.to_string()
}

pub(crate) fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

pub(crate) fn default_metadata() -> String {
    DEFAULT_METADATA.to_string()
}

pub(crate) fn default_is_enabled() -> bool {
    true
}
