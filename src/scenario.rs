use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{error, info, warn};

use crate::config::{ImageSettings, ScenarioSettings, Settings};
use crate::manager::{InstanceManager, STATUS_OK};
use crate::smoke::SuiteKind;

const RESOURCE_PREFIX: &str = "argus.";
/// Console lines requested first when archiving instance output.
const INITIAL_OUTPUT_LINES: usize = 128;

/// A scenario ready to be handed to a [`Provisioner`].
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub suites: Vec<SuiteKind>,
    pub recipe: String,
    /// Base64-encoded userdata payload.
    pub userdata: Option<String>,
    pub metadata: serde_json::Value,
    pub image: ImageSettings,
    pub service_type: String,
}

/// Brings up an instance for a scenario.
pub trait Provisioner {
    /// # Errors
    /// Returns an error when the instance cannot be prepared.
    fn provision(&self, scenario: &Scenario) -> Result<Box<dyn InstanceManager>>;
}

/// Restricts which configured scenarios run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    /// Keep scenarios whose image has one of these OS types; empty keeps all.
    pub os_types: Vec<String>,
    /// Keep only scenarios of this type.
    pub scenario_type: Option<String>,
}

impl ScenarioFilter {
    fn accepts(&self, settings: &Settings, scenario: &ScenarioSettings) -> bool {
        if !self.os_types.is_empty() {
            let Some(image) = settings.images.get(&scenario.image) else {
                return false;
            };
            if !self.os_types.contains(&image.os_type) {
                return false;
            }
        }
        if let Some(wanted) = &self.scenario_type
            && scenario.scenario_type.as_ref() != Some(wanted)
        {
            return false;
        }
        scenario.is_enabled
    }
}

/// Configured scenarios that pass `filter`, in name order.
#[must_use]
pub fn select_scenarios<'a>(
    settings: &'a Settings,
    filter: &ScenarioFilter,
) -> Vec<(&'a str, &'a ScenarioSettings)> {
    settings
        .scenarios
        .iter()
        .filter(|(_, scenario)| filter.accepts(settings, scenario))
        .map(|(name, scenario)| (name.as_str(), scenario))
        .collect()
}

/// Resolves userdata, metadata and image of a configured scenario.
///
/// # Errors
/// Returns an error when the image is unknown or userdata/metadata cannot be
/// loaded.
pub fn build_scenario(
    settings: &Settings,
    name: &str,
    scenario: &ScenarioSettings,
) -> Result<Scenario> {
    let image = settings
        .images
        .get(&scenario.image)
        .with_context(|| format!("Scenario {name} uses unknown image {}", scenario.image))?;
    let userdata = scenario
        .userdata
        .as_deref()
        .map(|userdata| load_userdata(&settings.argus.resources, userdata))
        .transpose()?
        .map(|payload| STANDARD.encode(payload));
    let metadata = load_metadata(&scenario.metadata)
        .with_context(|| format!("Invalid metadata for scenario {name}"))?;
    Ok(Scenario {
        name: name.to_string(),
        suites: scenario.test_classes.clone(),
        recipe: scenario.recipe.clone(),
        userdata,
        metadata,
        image: image.clone(),
        service_type: scenario.service_type.clone(),
    })
}

/// Loads a userdata payload.
///
/// `argus.<dir>.<name>` names a bundled resource `<resources>/<dir>/<name>`;
/// anything else is read as a file path.
///
/// # Errors
/// Returns an error if the payload cannot be read.
pub fn load_userdata(resources: &Path, userdata: &str) -> Result<Vec<u8>> {
    let path = match userdata.strip_prefix(RESOURCE_PREFIX) {
        Some(resource) => resources.join(resource.replace('.', "/")),
        None => PathBuf::from(userdata),
    };
    fs::read(&path).with_context(|| format!("Failed to read userdata {}", path.display()))
}

/// Parses metadata given inline or as a path to a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or the JSON is invalid.
pub fn load_metadata(metadata: &str) -> Result<serde_json::Value> {
    let path = Path::new(metadata);
    if path.is_file() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()));
    }
    serde_json::from_str(metadata).context("Failed to parse inline metadata")
}

/// Archives the instance console output as `<instance id>.log` in `out_dir`.
///
/// The request size doubles until the console returns fewer lines than
/// asked for. Returns the written path, or `None` when nothing was saved.
///
/// # Errors
/// Returns an error if the console request or the file write fails.
pub fn save_instance_output(
    manager: &dyn InstanceManager,
    out_dir: &Path,
) -> Result<Option<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("{}.log", manager.instance_id()));

    let mut size = INITIAL_OUTPUT_LINES;
    let content = loop {
        let console = manager.instance_output(size)?;
        if console.status != STATUS_OK {
            error!("Couldn't save console output <{}>.", console.status);
            return Ok(None);
        }
        if console.output.lines().count() >= size {
            size *= 2;
        } else {
            break console.output;
        }
    };

    if content.trim().is_empty() {
        warn!("Empty console output; nothing to save.");
        return Ok(None);
    }
    info!("Saving instance console output to: {}", path.display());
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
