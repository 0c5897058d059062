//! Post-boot smoke checks for cloudbase-init.
//!
//! The base checks hold for every guest OS. Checks whose expectation depends
//! on the userdata injected at boot are supplied through [`UserdataChecks`],
//! and each [`SuiteKind`] picks one implementation when it assembles its
//! check list.

use serde::Deserialize;

use crate::check::{Check, CheckResult, Precondition, ensure, ensure_eq, fail};
use crate::config::{CloudbaseinitSettings, ImageSettings};
use crate::dhcp::{DhcpConfig, MTU_OPTION, NTP_SERVERS_OPTION};
use crate::introspection::InstanceIntrospection;
use crate::manager::{InstanceManager, STATUS_OK};
use crate::remote::Protocol;

pub mod windows;

/// NetBIOS computer names are limited to 15 characters.
const NETBIOS_NAME_LENGTH: usize = 15;
const CONSOLE_OUTPUT_LINES: usize = 10;
const ECHO_COMMAND: &str = "echo 1";
const ECHO_EXPECTED: &str = "1";

/// Everything a check may look at.
pub struct SmokeContext<'a> {
    pub manager: &'a dyn InstanceManager,
    pub introspection: &'a dyn InstanceIntrospection,
    pub image: &'a ImageSettings,
    pub cloudbaseinit: &'a CloudbaseinitSettings,
    pub dhcp: &'a DhcpConfig,
}

/// Checks whose outcome depends on the userdata payload the instance
/// booted with. Every suite variant must provide all three.
pub trait UserdataChecks {
    fn cloudconfig_userdata(ctx: &SmokeContext<'_>) -> CheckResult;
    fn local_scripts_executed(ctx: &SmokeContext<'_>) -> CheckResult;
    fn userdata(ctx: &SmokeContext<'_>) -> CheckResult;
}

/// Suite variants selectable from a scenario's `test_classes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteKind {
    /// Windows checks against the bundled multipart userdata.
    WindowsMultipartUserdata,
}

impl SuiteKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SuiteKind::WindowsMultipartUserdata => "windows-multipart-userdata",
        }
    }

    #[must_use]
    pub fn checks(self) -> Vec<Check> {
        match self {
            SuiteKind::WindowsMultipartUserdata => {
                windows::windows_checks::<windows::MultipartUserdata>()
            }
        }
    }
}

/// Checks every guest OS must pass, followed by the userdata checks of `U`.
#[must_use]
pub fn base_checks<U: UserdataChecks>() -> Vec<Check> {
    vec![
        Check::new("plugins_count", plugins_count),
        Check::new("disk_expanded", disk_expanded),
        Check::new("username_created", username_created),
        Check::new("hostname_set", hostname_set),
        Check::with_precondition(
            "ntp_properly_configured",
            Precondition::DnsmasqConfigured,
            ntp_properly_configured,
        ),
        Check::new("password_set", password_set),
        Check::new("sshpublickeys_set", sshpublickeys_set),
        Check::with_precondition("mtu", Precondition::DnsmasqConfigured, mtu),
        Check::new("any_exception_occurred", any_exception_occurred),
        Check::new("user_belongs_to_group", user_belongs_to_group),
        Check::new("get_console_output", get_console_output),
        Check::new("cloudconfig_userdata", U::cloudconfig_userdata),
        Check::new("local_scripts_executed", U::local_scripts_executed),
        Check::new("userdata", U::userdata),
    ]
}

fn plugins_count(ctx: &SmokeContext<'_>) -> CheckResult {
    let count = ctx.introspection.get_plugins_count()?;
    ensure_eq(
        "plugins count",
        &ctx.cloudbaseinit.expected_plugins_count,
        &count,
    )
}

fn disk_expanded(ctx: &SmokeContext<'_>) -> CheckResult {
    let image = ctx.manager.get_image_ref()?;
    let disk_size = ctx.introspection.get_disk_size()?;
    ensure(
        disk_size > image.size,
        format!(
            "disk size {disk_size} is not greater than image size {}",
            image.size
        ),
    )
}

fn username_created(ctx: &SmokeContext<'_>) -> CheckResult {
    let exists = ctx.introspection.username_exists(&ctx.image.created_user)?;
    ensure(
        exists,
        format!("user {} does not exist", ctx.image.created_user),
    )
}

fn hostname_set(ctx: &SmokeContext<'_>) -> CheckResult {
    let instance_hostname = ctx.introspection.get_instance_hostname()?;
    let server = ctx.manager.instance_server()?;
    ensure_eq(
        "hostname",
        &expected_hostname(&server.name),
        &instance_hostname.to_lowercase(),
    )
}

/// Server name truncated to the NetBIOS length, then lower-cased.
pub(crate) fn expected_hostname(server_name: &str) -> String {
    server_name
        .chars()
        .take(NETBIOS_NAME_LENGTH)
        .collect::<String>()
        .to_lowercase()
}

fn ntp_properly_configured(ctx: &SmokeContext<'_>) -> CheckResult {
    let peers = ctx.introspection.get_instance_ntp_peers()?;
    let expected = ctx
        .dhcp
        .get_dhcp_override(NTP_SERVERS_OPTION)?
        .ok_or_else(|| fail("DHCP NTP option was not configured."))?;
    let expected_peers: Vec<String> = expected.split(',').map(str::to_string).collect();
    ensure_eq("NTP peers", &expected_peers, &peers)
}

fn password_set(ctx: &SmokeContext<'_>) -> CheckResult {
    let password = ctx.manager.instance_password()?;
    let client =
        ctx.manager
            .get_remote_client(&ctx.image.created_user, &password, Protocol::Http)?;
    let stdout = client.run_command_verbose(ECHO_COMMAND)?;
    ensure_eq("echo output", ECHO_EXPECTED, stdout.trim())
}

fn sshpublickeys_set(ctx: &SmokeContext<'_>) -> CheckResult {
    let authorized_keys = ctx.introspection.get_instance_keys_path()?;
    let public_key = ctx
        .introspection
        .get_instance_file_content(&authorized_keys)?
        .replace("\r\n", "\n");
    ensure_eq("authorized keys", ctx.manager.public_key(), public_key.as_str())
}

fn mtu(ctx: &SmokeContext<'_>) -> CheckResult {
    let mtu = ctx.introspection.get_instance_mtu()?;
    let expected = ctx.dhcp.get_dhcp_override(MTU_OPTION)?;
    ensure_eq("MTU", &expected, &Some(mtu))
}

fn any_exception_occurred(ctx: &SmokeContext<'_>) -> CheckResult {
    let traceback = ctx.introspection.get_cloudbaseinit_traceback()?;
    ensure_eq("cloudbase-init traceback", "", traceback.as_str())
}

fn user_belongs_to_group(ctx: &SmokeContext<'_>) -> CheckResult {
    let members = ctx.introspection.get_group_members(&ctx.image.group)?;
    ensure(
        members.contains(&ctx.image.created_user),
        format!(
            "{} is not a member of {}: {members:?}",
            ctx.image.created_user, ctx.image.group
        ),
    )
}

fn get_console_output(ctx: &SmokeContext<'_>) -> CheckResult {
    let console = ctx.manager.instance_output(CONSOLE_OUTPUT_LINES)?;
    ensure_eq("console output status", &STATUS_OK, &console.status)?;
    ensure(!console.output.is_empty(), "Console output was empty.")?;
    let lines = console.output.split('\n').count();
    ensure_eq("console output lines", &CONSOLE_OUTPUT_LINES, &lines)
}
