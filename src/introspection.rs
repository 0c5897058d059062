//! Read-only queries into a provisioned instance's post-boot state.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::config::ImageSettings;
use crate::manager::InstanceManager;

pub mod windows;

pub use windows::WindowsInstanceIntrospection;

/// Observed state of a booted instance, as cloudbase-init left it.
///
/// # Errors
/// Every query returns an error when the underlying remote command fails
/// or its output cannot be interpreted.
pub trait InstanceIntrospection {
    fn get_plugins_count(&self) -> Result<u64>;
    fn get_disk_size(&self) -> Result<u64>;
    fn username_exists(&self, username: &str) -> Result<bool>;
    fn get_instance_hostname(&self) -> Result<String>;
    fn get_instance_ntp_peers(&self) -> Result<Vec<String>>;
    fn get_instance_keys_path(&self) -> Result<String>;
    fn get_instance_file_content(&self, path: &str) -> Result<String>;
    fn get_cloudbaseinit_traceback(&self) -> Result<String>;
    fn get_group_members(&self, group: &str) -> Result<Vec<String>>;
    fn get_instance_mtu(&self) -> Result<String>;

    /// Returns `(start trigger, stop trigger)` of `service`.
    fn get_service_triggers(&self, service: &str) -> Result<(String, String)>;
    /// Marker file name → content for every cloudconfig part the handler wrote.
    fn get_cloudconfig_executed_plugins(&self) -> Result<BTreeMap<String, String>>;
    fn get_userdata_executed_plugins(&self) -> Result<u64>;
    fn instance_shell_script_executed(&self) -> Result<bool>;
}

/// Builds the introspection matching the image's operating system.
///
/// # Errors
/// Returns an error for operating systems without an introspection.
pub fn for_image<'a>(
    manager: &'a dyn InstanceManager,
    image: &'a ImageSettings,
) -> Result<Box<dyn InstanceIntrospection + 'a>> {
    if image.os_type.eq_ignore_ascii_case("windows") {
        return Ok(Box::new(WindowsInstanceIntrospection::new(
            manager.remote_client(),
            manager.instance_id(),
            image,
        )));
    }
    anyhow::bail!(
        "No introspection available for os_type '{}' (image {})",
        image.os_type,
        image.name
    )
}
