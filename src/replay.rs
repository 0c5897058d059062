//! Recorded instances served through the collaborator traits.
//!
//! A transcript captures what the compute API and the instance answered
//! during a real run: server and image records, the posted password, the
//! console log, which credentials the remote endpoint accepted and the
//! stdout of every command. Replaying it lets the suites run without a
//! cloud.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ImageSettings;
use crate::manager::{ConsoleOutput, ImageInfo, InstanceManager, ServerInfo};
use crate::remote::{Protocol, RemoteClient};
use crate::scenario::{Provisioner, Scenario};

#[derive(Debug, Deserialize)]
pub struct Transcript {
    pub server: ServerInfo,
    pub image: ImageInfo,
    pub password: String,
    pub public_key: String,
    pub console: ConsoleOutput,
    /// Credentials the remote endpoint accepts; empty accepts any.
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Transcript {
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse transcript {}", path.display()))
    }

    fn authenticate(&self, username: &str, password: &str, protocol: Protocol) -> Result<()> {
        if self.credentials.is_empty()
            || self.credentials.iter().any(|credential| {
                credential.username == username
                    && credential.password == password
                    && credential.protocol == protocol
            })
        {
            return Ok(());
        }
        anyhow::bail!("Authentication failed for {username} over {protocol}")
    }
}

/// Command channel answering from a transcript.
pub struct ReplayClient {
    transcript: Rc<Transcript>,
    username: String,
    protocol: Protocol,
}

impl RemoteClient for ReplayClient {
    fn run_command_verbose(&self, command: &str) -> Result<String> {
        debug!(
            "Replaying command as {} over {}: {command}",
            self.username, self.protocol
        );
        self.transcript
            .commands
            .get(command)
            .cloned()
            .with_context(|| format!("No recorded output for command: {command}"))
    }

    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let metadata = fs::metadata(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        debug!(
            "Replaying copy of {} ({} bytes) to {remote_path}",
            local_path.display(),
            metadata.len()
        );
        Ok(())
    }
}

pub struct ReplayManager {
    transcript: Rc<Transcript>,
    default_client: ReplayClient,
}

impl ReplayManager {
    /// Opens the default channel with the image's CI credentials.
    ///
    /// # Errors
    /// Returns an error if the transcript rejects the default credentials.
    pub fn new(transcript: Transcript, image: &ImageSettings) -> Result<Self> {
        let transcript = Rc::new(transcript);
        let default_client = open_client(
            &transcript,
            &image.default_ci_username,
            &image.default_ci_password,
            Protocol::Http,
        )?;
        Ok(Self {
            transcript,
            default_client,
        })
    }
}

fn open_client(
    transcript: &Rc<Transcript>,
    username: &str,
    password: &str,
    protocol: Protocol,
) -> Result<ReplayClient> {
    transcript.authenticate(username, password, protocol)?;
    Ok(ReplayClient {
        transcript: Rc::clone(transcript),
        username: username.to_string(),
        protocol,
    })
}

impl InstanceManager for ReplayManager {
    fn instance_id(&self) -> &str {
        &self.transcript.server.id
    }

    fn get_image_ref(&self) -> Result<ImageInfo> {
        Ok(self.transcript.image.clone())
    }

    fn instance_server(&self) -> Result<ServerInfo> {
        Ok(self.transcript.server.clone())
    }

    fn remote_client(&self) -> &dyn RemoteClient {
        &self.default_client
    }

    fn get_remote_client(
        &self,
        username: &str,
        password: &str,
        protocol: Protocol,
    ) -> Result<Box<dyn RemoteClient>> {
        Ok(Box::new(open_client(
            &self.transcript,
            username,
            password,
            protocol,
        )?))
    }

    fn instance_password(&self) -> Result<String> {
        Ok(self.transcript.password.clone())
    }

    fn public_key(&self) -> &str {
        &self.transcript.public_key
    }

    fn instance_output(&self, limit: usize) -> Result<ConsoleOutput> {
        let console = &self.transcript.console;
        Ok(ConsoleOutput {
            status: console.status,
            output: tail_lines(&console.output, limit),
        })
    }
}

/// Last `limit` lines of `output`, joined with `\n`.
fn tail_lines(output: &str, limit: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(limit);
    lines[start..].join("\n")
}

/// Serves `<dir>/<scenario name>.json` for each scenario.
pub struct ReplayProvisioner {
    dir: PathBuf,
}

impl ReplayProvisioner {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl Provisioner for ReplayProvisioner {
    fn provision(&self, scenario: &Scenario) -> Result<Box<dyn InstanceManager>> {
        let path = self.dir.join(format!("{}.json", scenario.name));
        let transcript = Transcript::load(&path)?;
        info!(
            "Replaying instance {} for scenario {} (recipe {}, service type {})",
            transcript.server.id, scenario.name, scenario.recipe, scenario.service_type
        );
        Ok(Box::new(ReplayManager::new(transcript, &scenario.image)?))
    }
}
