use anyhow::Result;

use super::{ScenarioSettings, Settings};

pub(crate) fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.argus.resources.as_os_str().is_empty() {
        anyhow::bail!("argus.resources must not be empty");
    }
    if settings.dhcp.agent_config.as_os_str().is_empty() {
        anyhow::bail!("dhcp.agent_config must not be empty");
    }
    if settings.dhcp.dnsmasq_config.as_os_str().is_empty() {
        anyhow::bail!("dhcp.dnsmasq_config must not be empty");
    }
    for (name, image) in &settings.images {
        if image.image_ref.trim().is_empty() {
            anyhow::bail!("images.{name}.image_ref must not be empty");
        }
        if image.created_user.trim().is_empty() {
            anyhow::bail!("images.{name}.created_user must not be empty");
        }
        if image.group.trim().is_empty() {
            anyhow::bail!("images.{name}.group must not be empty");
        }
    }
    for (name, scenario) in &settings.scenarios {
        validate_scenario(settings, name, scenario)?;
    }
    Ok(())
}

fn validate_scenario(settings: &Settings, name: &str, scenario: &ScenarioSettings) -> Result<()> {
    if scenario.test_classes.is_empty() {
        anyhow::bail!("scenarios.{name}.test_classes must not be empty");
    }
    if scenario.recipe.trim().is_empty() {
        anyhow::bail!("scenarios.{name}.recipe must not be empty");
    }
    if !settings.images.contains_key(&scenario.image) {
        anyhow::bail!(
            "scenarios.{name}.image refers to unknown image '{}'",
            scenario.image
        );
    }
    Ok(())
}
