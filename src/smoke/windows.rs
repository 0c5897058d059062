use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;

use super::{ECHO_COMMAND, ECHO_EXPECTED, SmokeContext, UserdataChecks, base_checks};
use crate::check::{Check, CheckResult, Precondition, ensure, ensure_eq, fail};
use crate::introspection::windows::CLOUDCONFIG_MARKER_FILES;
use crate::remote::Protocol;

const SERVICE_DISPLAY_NAME_COMMAND: &str =
    r#"powershell (Get-Service "| where -Property Name -match cloudbase-init").DisplayName"#;
const NTP_SERVICE_STATUS_COMMAND: &str =
    r#"powershell (Get-Service "| where -Property Name -match W32Time").Status"#;
const LICENSING_COMMAND: &str = r#"powershell "Get-WmiObject SoftwareLicensingProduct | where PartialProductKey | Select Name, LicenseStatus""#;
const POWERSHELL_OUTPUT_COMMAND: &str = r#"powershell "Test-Path C:\Scripts\powershell.output""#;

const EXPECTED_DISPLAY_NAME: &str = "Cloud Initialization Service\r\n";
const EXPECTED_NTP_STATUS: &str = "Running\r\n";
const EXPECTED_START_TRIGGER: &str = "IP ADDRESS AVAILABILITY";
const LICENSED: i64 = 1;
const TIME_SERVICE: &str = "w32time";
const CLOUDCONFIG_CONTENT: &str = "42";
const MULTIPART_USERDATA_PLUGINS: u64 = 4;

/// Base checks, the Windows service and licensing checks, then the userdata
/// checks of `U`.
#[must_use]
pub fn windows_checks<U: UserdataChecks>() -> Vec<Check> {
    let mut checks = base_checks::<U>();
    checks.extend([
        Check::new("service_display_name", service_display_name),
        Check::with_precondition(
            "ntp_service_running",
            Precondition::DnsmasqConfigured,
            ntp_service_running,
        ),
        Check::new("licensing", licensing),
        Check::new("https_winrm_configured", https_winrm_configured),
        Check::with_precondition(
            "w32time_triggers",
            Precondition::DnsmasqConfigured,
            w32time_triggers,
        ),
    ]);
    checks
}

fn service_display_name(ctx: &SmokeContext<'_>) -> CheckResult {
    let stdout = ctx
        .manager
        .remote_client()
        .run_command_verbose(SERVICE_DISPLAY_NAME_COMMAND)?;
    ensure_eq("service display name", EXPECTED_DISPLAY_NAME, stdout.as_str())
}

fn ntp_service_running(ctx: &SmokeContext<'_>) -> CheckResult {
    let stdout = ctx
        .manager
        .remote_client()
        .run_command_verbose(NTP_SERVICE_STATUS_COMMAND)?;
    ensure_eq("W32Time status", EXPECTED_NTP_STATUS, stdout.as_str())
}

fn licensing(ctx: &SmokeContext<'_>) -> CheckResult {
    let stdout = ctx
        .manager
        .remote_client()
        .run_command_verbose(LICENSING_COMMAND)?;
    let licenses = parse_licenses(&stdout);
    if licenses.len() > 1 {
        return Err(fail("Too many expected products in licensing output."));
    }
    let (product, status) = licenses
        .iter()
        .next()
        .ok_or_else(|| fail("No licensed products in licensing output."))?;
    let status = status
        .parse::<i64>()
        .with_context(|| format!("Invalid license status '{status}' for {product}"))?;
    ensure_eq("license status", &LICENSED, &status)
}

/// Parses the `Name`/`LicenseStatus` table into product name → status.
///
/// The first two lines are the header and its separator. Each row is split
/// at its last whitespace into product and status.
pub(crate) fn parse_licenses(output: &str) -> BTreeMap<String, String> {
    output
        .trim()
        .lines()
        .skip(2)
        .map(|line| {
            let line = line.trim_end();
            let (product, status) = line
                .rsplit_once(char::is_whitespace)
                .unwrap_or(("", line));
            (product.trim().to_string(), status.to_string())
        })
        .collect()
}

fn https_winrm_configured(ctx: &SmokeContext<'_>) -> CheckResult {
    let client = ctx.manager.get_remote_client(
        &ctx.image.default_ci_username,
        &ctx.image.default_ci_password,
        Protocol::Https,
    )?;
    let stdout = client.run_command_verbose(ECHO_COMMAND)?;
    ensure_eq("echo output over https", ECHO_EXPECTED, stdout.trim())
}

fn w32time_triggers(ctx: &SmokeContext<'_>) -> CheckResult {
    let (start_trigger, _) = ctx.introspection.get_service_triggers(TIME_SERVICE)?;
    ensure_eq(
        "w32time start trigger",
        EXPECTED_START_TRIGGER,
        start_trigger.as_str(),
    )
}

/// Expectations tied to `resources/windows/multipart_userdata`.
pub struct MultipartUserdata;

impl UserdataChecks for MultipartUserdata {
    fn cloudconfig_userdata(ctx: &SmokeContext<'_>) -> CheckResult {
        let files = ctx.introspection.get_cloudconfig_executed_plugins()?;
        let all_present = CLOUDCONFIG_MARKER_FILES
            .iter()
            .all(|name| files.contains_key(*name));
        ensure(
            all_present,
            format!(
                "The expected set is not subset of {:?}",
                files.keys().collect::<Vec<_>>()
            ),
        )?;

        let contents: BTreeSet<&str> = files.values().map(String::as_str).collect();
        ensure_eq(
            "cloudconfig file contents",
            &BTreeSet::from([CLOUDCONFIG_CONTENT]),
            &contents,
        )
    }

    fn local_scripts_executed(ctx: &SmokeContext<'_>) -> CheckResult {
        ensure(
            ctx.introspection.instance_shell_script_executed()?,
            "shell local script did not run",
        )?;
        let stdout = ctx
            .manager
            .remote_client()
            .run_command_verbose(POWERSHELL_OUTPUT_COMMAND)?;
        ensure_eq("powershell local script output", "True", stdout.trim())
    }

    fn userdata(ctx: &SmokeContext<'_>) -> CheckResult {
        let executed = ctx.introspection.get_userdata_executed_plugins()?;
        ensure_eq(
            "executed userdata plugins",
            &MULTIPART_USERDATA_PLUGINS,
            &executed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Name                                     LicenseStatus\r\n\
        ----                                     -------------\r\n";

    #[test]
    fn test_parse_licenses_single_product() {
        let output = format!(
            "\r\n{HEADER}Windows(R), ServerDatacenter edition               1\r\n\r\n"
        );
        let licenses = parse_licenses(&output);
        assert_eq!(licenses.len(), 1);
        assert_eq!(
            licenses
                .get("Windows(R), ServerDatacenter edition")
                .map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_parse_licenses_multiple_products() {
        let output = format!(
            "{HEADER}Windows(R), ServerDatacenter edition    1\r\n\
             Office 15, OfficeProPlusVL_KMS_Client edition    0\r\n"
        );
        let licenses = parse_licenses(&output);
        assert_eq!(licenses.len(), 2);
        assert_eq!(
            licenses
                .get("Office 15, OfficeProPlusVL_KMS_Client edition")
                .map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn test_parse_licenses_header_only() {
        assert!(parse_licenses(HEADER).is_empty());
    }

    #[test]
    fn test_windows_checks_extend_base_checks() {
        let names: Vec<_> = windows_checks::<MultipartUserdata>()
            .iter()
            .map(|check| check.name)
            .collect();
        assert_eq!(names.len(), 19);
        assert!(names.contains(&"cloudconfig_userdata"));
        assert_eq!(names.last(), Some(&"w32time_triggers"));
    }
}
