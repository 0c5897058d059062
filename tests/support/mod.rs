// Helper functions are shared across multiple test crates; not every helper is
// referenced in each test module.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Value, json};

pub(crate) const INSTANCE_ID: &str = "9b2f4c1e-inst";
pub(crate) const SERVER_NAME: &str = "WIN-SMOKE-01";
pub(crate) const PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2E argus@ci\n";
pub(crate) const INSTANCE_PASSWORD: &str = "Gen3rated!";
pub(crate) const SCENARIO: &str = "windows_smoke";

pub(crate) const HOSTNAME_COMMAND: &str = r#"powershell (Get-WmiObject "Win32_ComputerSystem").Name"#;
pub(crate) const LICENSING_COMMAND: &str = r#"powershell "Get-WmiObject SoftwareLicensingProduct | where PartialProductKey | Select Name, LicenseStatus""#;
pub(crate) const NTP_PEERS_COMMAND: &str = "w32tm /query /peers";

pub(crate) const LICENSING_HEADER: &str = "\r\nName                                          LicenseStatus\r\n\
    ----                                          -------------\r\n";

/// Console log of `lines` numbered lines.
pub(crate) fn console_lines(lines: usize) -> String {
    (1..=lines)
        .map(|idx| format!("cloudbase-init boot line {idx}\n"))
        .collect()
}

/// Transcript of a Windows instance on which every smoke check passes.
pub(crate) fn passing_transcript() -> Value {
    let plugins = format!(
        "powershell (Get-Item HKLM:SOFTWARE\\Wow6432Node\\Cloudbase` Solutions\\Cloudbase-init\\{INSTANCE_ID}\\Plugins).ValueCount"
    );
    let mut commands = json!({
        plugins: "13\r\n",
        r#"powershell (Get-WmiObject "win32_logicaldisk | where -Property DeviceID -Match C:").Size"#: "42947571712\r\n",
        r#"powershell "Get-WmiObject Win32_Account | where -Property Name -contains Admin""#:
            "\r\nAccountType : 512\r\nCaption     : WIN-SMOKE-01\\Admin\r\nName        : Admin\r\n",
        HOSTNAME_COMMAND: "WIN-SMOKE-01\r\n",
        NTP_PEERS_COMMAND: "#Peers: 2\r\n\r\nPeer: 10.0.0.1,10.0.0.2\r\nState: Active\r\nTime Remaining: 898.0s\r\n",
        "echo 1": "1\r\n",
        "echo %cd%": "C:\\Users\\CiAdmin\r\n",
        r#"powershell "cat C:\Users\Admin\.ssh\authorized_keys""#: "ssh-rsa AAAAB3NzaC1yc2E argus@ci\r\n",
        r#"powershell "(Get-NetIpConfiguration -Detailed).NetIPv4Interface.NlMTU""#: "1450\r\n",
        r"powershell C:\argus-get-traceback.ps1": "\r\n",
        "net localgroup Administrators": "Alias name     Administrators\r\n\
            Comment        Administrators have complete and unrestricted access\r\n\r\n\
            Members\r\n\r\n\
            -------------------------------------------------------------------------------\r\n\
            Admin\r\nCiAdmin\r\n\
            The command completed successfully.\r\n\r\n",
        r#"powershell "Test-Path C:\Scripts\shell.output""#: "True\r\n",
        r#"powershell "Test-Path C:\Scripts\powershell.output""#: "True\r\n",
        r#"powershell "(Get-ChildItem -Path  C:\ *.txt).Count"#: "4\r\n",
        r#"powershell (Get-Service "| where -Property Name -match cloudbase-init").DisplayName"#:
            "Cloud Initialization Service\r\n",
        r#"powershell (Get-Service "| where -Property Name -match W32Time").Status"#: "Running\r\n",
        LICENSING_COMMAND: format!(
            "{LICENSING_HEADER}Windows(R), ServerStandard edition            1\r\n\r\n"
        ),
        "sc qtriggerinfo w32time": "[SC] QueryServiceConfig2 SUCCESS\r\n\r\n\
            SERVICE_NAME: w32time\r\n\r\n\
            \x20       START SERVICE\r\n\
            \x20         IP ADDRESS AVAILABILITY                      : 4b6e9f1d-2c7b-4a5e-9c0e-1b1e5e3f1a2b [FIRST IP ADDRESS AVAILABLE]\r\n\
            \x20       STOP SERVICE\r\n\
            \x20         IP ADDRESS AVAILABILITY                      : 4b6e9f1d-2c7b-4a5e-9c0e-1b1e5e3f1a2b [LAST IP ADDRESS REMOVAL]\r\n",
    });
    for name in [
        "b64",
        "b64_1",
        "gzip",
        "gzip_1",
        "gzip_base64",
        "gzip_base64_1",
        "gzip_base64_2",
    ] {
        commands[format!("powershell \"cat C:\\{name}\"")] = json!("42\r\n");
    }

    json!({
        "server": {"id": INSTANCE_ID, "name": SERVER_NAME},
        "image": {"id": "img-win2012r2", "size": 10_737_418_240_u64},
        "password": INSTANCE_PASSWORD,
        "public_key": PUBLIC_KEY,
        "console": {"status": 200, "output": console_lines(24)},
        "credentials": [
            {"username": "CiAdmin", "password": "Passw0rd", "protocol": "http"},
            {"username": "CiAdmin", "password": "Passw0rd", "protocol": "https"},
            {"username": "Admin", "password": INSTANCE_PASSWORD, "protocol": "http"}
        ],
        "commands": commands,
    })
}

pub(crate) fn write_transcript(dir: &Path, scenario: &str, transcript: &Value) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("Failed to create transcript dir")?;
    let path = dir.join(format!("{scenario}.json"));
    let contents = serde_json::to_string_pretty(transcript).context("Failed to encode transcript")?;
    fs::write(&path, contents).context("Failed to write transcript")?;
    Ok(path)
}

/// Writes neutron DHCP files under `root`. When `options` is `Some`, the agent
/// config points at a dnsmasq file holding those `dhcp-option-force` lines.
pub(crate) fn write_dhcp(root: &Path, options: Option<&[&str]>) -> Result<(PathBuf, PathBuf)> {
    let agent = root.join("dhcp_agent.ini");
    let dnsmasq = root.join("dnsmasq-neutron.conf");
    let mut agent_config = String::from("[DEFAULT]\ninterface_driver = openvswitch\n");
    if let Some(options) = options {
        agent_config.push_str(&format!("dnsmasq_config_file = {}\n", dnsmasq.display()));
        let lines: String = options
            .iter()
            .map(|option| format!("dhcp-option-force={option}\n"))
            .collect();
        fs::write(&dnsmasq, lines).context("Failed to write dnsmasq config")?;
    }
    fs::write(&agent, agent_config).context("Failed to write dhcp agent config")?;
    Ok((agent, dnsmasq))
}

pub(crate) const DHCP_OPTIONS: &[&str] = &["42,10.0.0.1,10.0.0.2", "26,1450"];

/// Writes `argus.toml` with one Windows image and the `windows_smoke`
/// scenario using the bundled multipart userdata. `argus_extra` lands in the
/// `[argus]` table.
pub(crate) fn write_config(root: &Path, argus_extra: &str) -> Result<PathBuf> {
    let resources = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
    let contents = format!(
        r#"
[argus]
resources = {resources:?}
{argus_extra}

[dhcp]
agent_config = {agent:?}
dnsmasq_config = {dnsmasq:?}

[images.win2012r2]
image_ref = "img-win2012r2"
group = "Administrators"
created_user = "Admin"

[scenarios.{SCENARIO}]
test_classes = ["windows-multipart-userdata"]
recipe = "windows-cloudbaseinit"
userdata = "argus.windows.multipart_userdata"
image = "win2012r2"
type = "smoke"
"#,
        resources = resources.display().to_string(),
        agent = root.join("dhcp_agent.ini").display().to_string(),
        dnsmasq = root.join("dnsmasq-neutron.conf").display().to_string(),
    );
    let path = root.join("argus.toml");
    fs::write(&path, contents).context("Failed to write argus.toml")?;
    Ok(path)
}
