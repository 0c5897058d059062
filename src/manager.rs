use anyhow::Result;
use serde::Deserialize;

use crate::remote::{Protocol, RemoteClient};

/// HTTP status expected from a successful console output request.
pub const STATUS_OK: u16 = 200;

/// Image record as reported by the compute API.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    /// Declared image size in bytes.
    pub size: u64,
}

/// Server record as reported by the compute API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleOutput {
    pub status: u16,
    pub output: String,
}

/// Lifecycle and control handle for one provisioned instance.
pub trait InstanceManager {
    fn instance_id(&self) -> &str;

    /// # Errors
    /// Returns an error when the image record cannot be fetched.
    fn get_image_ref(&self) -> Result<ImageInfo>;

    /// # Errors
    /// Returns an error when the server record cannot be fetched.
    fn instance_server(&self) -> Result<ServerInfo>;

    /// Client authenticated with the image's default credentials over HTTP.
    fn remote_client(&self) -> &dyn RemoteClient;

    /// Opens a new client with explicit credentials and transport.
    ///
    /// # Errors
    /// Returns an error when the channel cannot be opened or authenticated.
    fn get_remote_client(
        &self,
        username: &str,
        password: &str,
        protocol: Protocol,
    ) -> Result<Box<dyn RemoteClient>>;

    /// Password the instance posted for the created user.
    ///
    /// # Errors
    /// Returns an error when the password is unavailable.
    fn instance_password(&self) -> Result<String>;

    fn public_key(&self) -> &str;

    /// Last `limit` lines of the instance console.
    ///
    /// # Errors
    /// Returns an error when the request itself cannot be made.
    fn instance_output(&self, limit: usize) -> Result<ConsoleOutput>;

    /// Releases resources held for the instance.
    ///
    /// # Errors
    /// Returns an error when teardown fails.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
