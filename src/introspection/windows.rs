use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use super::InstanceIntrospection;
use crate::config::ImageSettings;
use crate::remote::RemoteClient;

/// Marker files written by the cloudconfig part handler of the multipart
/// userdata, each holding `42` in a different encoding.
pub const CLOUDCONFIG_MARKER_FILES: [&str; 7] = [
    "b64",
    "b64_1",
    "gzip",
    "gzip_1",
    "gzip_base64",
    "gzip_base64_1",
    "gzip_base64_2",
];

const TRACEBACK_SCRIPT: &str = include_str!("../../resources/windows/get_traceback.ps1");
const REMOTE_TRACEBACK_SCRIPT: &str = "C:\\argus-get-traceback.ps1";
const WINDOWS_SEP: char = '\\';

const DISK_SIZE_COMMAND: &str =
    r#"powershell (Get-WmiObject "win32_logicaldisk | where -Property DeviceID -Match C:").Size"#;
const HOSTNAME_COMMAND: &str = r#"powershell (Get-WmiObject "Win32_ComputerSystem").Name"#;
const NTP_PEERS_COMMAND: &str = "w32tm /query /peers";
const CURRENT_DIR_COMMAND: &str = "echo %cd%";
const USERDATA_PLUGINS_COMMAND: &str = r#"powershell "(Get-ChildItem -Path  C:\ *.txt).Count"#;
const MTU_COMMAND: &str = r#"powershell "(Get-NetIpConfiguration -Detailed).NetIPv4Interface.NlMTU""#;
const SHELL_SCRIPT_OUTPUT_COMMAND: &str = r#"powershell "Test-Path C:\Scripts\shell.output""#;

/// Introspection of a Windows guest through its remote command channel.
pub struct WindowsInstanceIntrospection<'a> {
    remote_client: &'a dyn RemoteClient,
    instance_id: &'a str,
    image: &'a ImageSettings,
}

impl<'a> WindowsInstanceIntrospection<'a> {
    #[must_use]
    pub fn new(
        remote_client: &'a dyn RemoteClient,
        instance_id: &'a str,
        image: &'a ImageSettings,
    ) -> Self {
        Self {
            remote_client,
            instance_id,
            image,
        }
    }

    fn run(&self, command: &str) -> Result<String> {
        debug!("Running introspection command: {command}");
        self.remote_client.run_command_verbose(command)
    }
}

impl InstanceIntrospection for WindowsInstanceIntrospection<'_> {
    fn get_plugins_count(&self) -> Result<u64> {
        let key = format!(
            "HKLM:SOFTWARE\\Wow6432Node\\Cloudbase` Solutions\\Cloudbase-init\\{}\\Plugins",
            self.instance_id
        );
        let stdout = self.run(&format!("powershell (Get-Item {key}).ValueCount"))?;
        parse_count(&stdout).context("Failed to parse cloudbase-init plugins count")
    }

    fn get_disk_size(&self) -> Result<u64> {
        let stdout = self.run(DISK_SIZE_COMMAND)?;
        parse_count(&stdout).context("Failed to parse disk size")
    }

    fn username_exists(&self, username: &str) -> Result<bool> {
        let stdout = self.run(&format!(
            "powershell \"Get-WmiObject Win32_Account | where -Property Name -contains {username}\""
        ))?;
        Ok(!stdout.is_empty())
    }

    fn get_instance_hostname(&self) -> Result<String> {
        let stdout = self.run(HOSTNAME_COMMAND)?;
        Ok(stdout.to_lowercase().trim().to_string())
    }

    fn get_instance_ntp_peers(&self) -> Result<Vec<String>> {
        let stdout = self.run(NTP_PEERS_COMMAND)?;
        Ok(parse_ntp_peers(&stdout))
    }

    fn get_instance_keys_path(&self) -> Result<String> {
        let stdout = self.run(CURRENT_DIR_COMMAND)?;
        let homedir = stdout.rsplit_once(WINDOWS_SEP).map_or("", |(head, _)| head);
        Ok(windows_join(&[
            homedir,
            &self.image.created_user,
            ".ssh",
            "authorized_keys",
        ]))
    }

    fn get_instance_file_content(&self, path: &str) -> Result<String> {
        self.run(&format!("powershell \"cat {path}\""))
    }

    fn get_cloudbaseinit_traceback(&self) -> Result<String> {
        let mut script = tempfile::Builder::new()
            .prefix("cloudbaseinit-ci-tests")
            .suffix(".ps1")
            .tempfile()
            .context("Failed to create traceback script")?;
        script
            .write_all(TRACEBACK_SCRIPT.as_bytes())
            .and_then(|()| script.flush())
            .context("Failed to write traceback script")?;

        self.remote_client
            .copy_file(script.path(), REMOTE_TRACEBACK_SCRIPT)?;
        let stdout = self.run(&format!("powershell {REMOTE_TRACEBACK_SCRIPT}"))?;
        Ok(stdout.trim().to_string())
    }

    fn get_group_members(&self, group: &str) -> Result<Vec<String>> {
        let stdout = self.run(&format!("net localgroup {group}"))?;
        parse_group_members(&stdout)
    }

    fn get_instance_mtu(&self) -> Result<String> {
        let stdout = self.run(MTU_COMMAND)?;
        Ok(trim_line_endings(&stdout).to_string())
    }

    fn get_service_triggers(&self, service: &str) -> Result<(String, String)> {
        let stdout = self.run(&format!("sc qtriggerinfo {service}"))?;
        parse_service_triggers(&stdout)
    }

    fn get_cloudconfig_executed_plugins(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        for name in CLOUDCONFIG_MARKER_FILES {
            let path = windows_join(&["C:", name]);
            let content = self.get_instance_file_content(&path)?;
            files.insert(name.to_string(), trim_line_endings(&content).to_string());
        }
        Ok(files)
    }

    fn get_userdata_executed_plugins(&self) -> Result<u64> {
        let stdout = self.run(USERDATA_PLUGINS_COMMAND)?;
        parse_count(&stdout).context("Failed to parse executed userdata plugins count")
    }

    fn instance_shell_script_executed(&self) -> Result<bool> {
        let stdout = self.run(SHELL_SCRIPT_OUTPUT_COMMAND)?;
        Ok(stdout.trim() == "True")
    }
}

fn parse_count(stdout: &str) -> Result<u64> {
    let value = stdout.trim();
    value
        .parse::<u64>()
        .with_context(|| format!("'{value}' is not a number"))
}

fn trim_line_endings(value: &str) -> &str {
    value.trim_matches(|c| c == '\r' || c == '\n')
}

fn windows_join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\\")
}

/// Collects the peers listed on `Peer: ` lines of `w32tm /query /peers`.
pub(crate) fn parse_ntp_peers(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("Peer: "))
        .filter_map(|line| line.split_once(':').map(|(_, peers)| peers))
        .flat_map(|peers| peers.split(','))
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

const GROUP_MEMBERS_PATTERN: &str = r"(?s)Members\s+-+\s+(.*?)The\s+command";
const SERVICE_TRIGGERS_PATTERN: &str = r"(?s)START SERVICE\s+(.*?):.*?STOP SERVICE\s+(.*?):";

/// Extracts member names from `net localgroup <group>` output: everything
/// between the dashed separator after `Members` and `The command ...`.
pub(crate) fn parse_group_members(output: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(GROUP_MEMBERS_PATTERN)?;
    let captures = pattern
        .captures(output)
        .context("Unable to get members.")?;
    Ok(captures[1]
        .split_whitespace()
        .map(str::to_string)
        .collect())
}

/// Extracts the start and stop trigger names from `sc qtriggerinfo` output.
pub(crate) fn parse_service_triggers(output: &str) -> Result<(String, String)> {
    let pattern = Regex::new(SERVICE_TRIGGERS_PATTERN)?;
    let captures = pattern
        .captures(output)
        .context("Unable to get the triggers for the given service.")?;
    Ok((
        captures[1].trim().to_string(),
        captures[2].trim().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;

    struct FakeClient {
        outputs: HashMap<String, String>,
        copied: RefCell<Vec<(String, String)>>,
    }

    impl FakeClient {
        fn new(outputs: &[(&str, &str)]) -> Self {
            Self {
                outputs: outputs
                    .iter()
                    .map(|(cmd, out)| ((*cmd).to_string(), (*out).to_string()))
                    .collect(),
                copied: RefCell::new(Vec::new()),
            }
        }
    }

    impl RemoteClient for FakeClient {
        fn run_command_verbose(&self, command: &str) -> Result<String> {
            self.outputs
                .get(command)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unexpected command: {command}"))
        }

        fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
            let content = std::fs::read_to_string(local_path)?;
            self.copied
                .borrow_mut()
                .push((content, remote_path.to_string()));
            Ok(())
        }
    }

    fn image() -> ImageSettings {
        ImageSettings {
            name: "win2012".to_string(),
            default_ci_username: "CiAdmin".to_string(),
            default_ci_password: "Passw0rd".to_string(),
            image_ref: "img-1".to_string(),
            flavor_ref: "flavor-1".to_string(),
            group: "Administrators".to_string(),
            created_user: "Admin".to_string(),
            os_type: "Windows".to_string(),
        }
    }

    #[test]
    fn test_parse_ntp_peers_keeps_order() {
        let output = "#Peers: 2\r\n\r\nPeer: 10.0.0.1,0x8\r\nState: Active\r\n\r\nPeer: 10.0.0.2\r\n";
        assert_eq!(parse_ntp_peers(output), vec!["10.0.0.1", "0x8", "10.0.0.2"]);
    }

    #[test]
    fn test_parse_group_members() {
        let output = "Alias name     Administrators\r\n\
            Comment        Administrators have complete access\r\n\r\n\
            Members\r\n\r\n\
            -------------------------------------------------------------------------------\r\n\
            Admin\r\nCiAdmin\r\n\
            The command completed successfully.\r\n";
        assert_eq!(parse_group_members(output).unwrap(), vec!["Admin", "CiAdmin"]);
    }

    #[test]
    fn test_parse_group_members_skips_members_word_in_comment() {
        let output = "Alias name     Operators\r\n\
            Comment        Members can run backups\r\n\r\n\
            Members\r\n\r\n\
            ----------------------------------------\r\n\
            Admin\r\n\
            The command completed successfully.\r\n";
        assert_eq!(parse_group_members(output).unwrap(), vec!["Admin"]);
    }

    #[test]
    fn test_parse_group_members_empty_group() {
        let output = "Members\r\n\r\n-----------\r\nThe command completed successfully.\r\n";
        assert!(parse_group_members(output).unwrap().is_empty());
    }

    #[test]
    fn test_parse_group_members_without_section_fails() {
        let err = parse_group_members("System error 1376 has occurred.").unwrap_err();
        assert_eq!(err.to_string(), "Unable to get members.");
    }

    #[test]
    fn test_parse_service_triggers() {
        let output = "[SC] QueryServiceConfig2 SUCCESS\r\n\r\n\
            SERVICE_NAME: w32time\r\n\r\n\
            \x20       START SERVICE\r\n\
            \x20         IP ADDRESS AVAILABILITY    : 4fc9b6d7 [FIRST IP ADDRESS AVAILABLE]\r\n\
            \x20       STOP SERVICE\r\n\
            \x20         IP ADDRESS AVAILABILITY    : 4fc9b6d7 [LAST IP ADDRESS REMOVAL]\r\n";
        let (start, stop) = parse_service_triggers(output).unwrap();
        assert_eq!(start, "IP ADDRESS AVAILABILITY");
        assert_eq!(stop, "IP ADDRESS AVAILABILITY");
    }

    #[test]
    fn test_parse_service_triggers_missing() {
        assert!(parse_service_triggers("[SC] no triggers").is_err());
    }

    #[test]
    fn test_keys_path_uses_parent_of_current_dir() {
        let client = FakeClient::new(&[(CURRENT_DIR_COMMAND, "C:\\Users\\CiAdmin\r\n")]);
        let image = image();
        let introspection = WindowsInstanceIntrospection::new(&client, "inst-1", &image);
        assert_eq!(
            introspection.get_instance_keys_path().unwrap(),
            "C:\\Users\\Admin\\.ssh\\authorized_keys"
        );
    }

    #[test]
    fn test_plugins_count_uses_instance_registry_key() {
        let command = "powershell (Get-Item HKLM:SOFTWARE\\Wow6432Node\\Cloudbase` Solutions\\\
            Cloudbase-init\\inst-1\\Plugins).ValueCount";
        let client = FakeClient::new(&[(command, "13\r\n")]);
        let image = image();
        let introspection = WindowsInstanceIntrospection::new(&client, "inst-1", &image);
        assert_eq!(introspection.get_plugins_count().unwrap(), 13);
    }

    #[test]
    fn test_hostname_and_mtu_are_normalized() {
        let client = FakeClient::new(&[
            (HOSTNAME_COMMAND, "MY-TEST-SERVER\r\n"),
            (MTU_COMMAND, "1450\r\n"),
        ]);
        let image = image();
        let introspection = WindowsInstanceIntrospection::new(&client, "inst-1", &image);
        assert_eq!(introspection.get_instance_hostname().unwrap(), "my-test-server");
        assert_eq!(introspection.get_instance_mtu().unwrap(), "1450");
    }

    #[test]
    fn test_traceback_script_is_copied_then_run() {
        let run = format!("powershell {REMOTE_TRACEBACK_SCRIPT}");
        let client = FakeClient::new(&[(run.as_str(), "\r\n")]);
        let image = image();
        let introspection = WindowsInstanceIntrospection::new(&client, "inst-1", &image);

        assert_eq!(introspection.get_cloudbaseinit_traceback().unwrap(), "");
        let copied = client.copied.borrow();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].0, TRACEBACK_SCRIPT);
        assert_eq!(copied[0].1, REMOTE_TRACEBACK_SCRIPT);
    }

    #[test]
    fn test_non_numeric_count_is_an_error() {
        let client = FakeClient::new(&[(USERDATA_PLUGINS_COMMAND, "Access denied")]);
        let image = image();
        let introspection = WindowsInstanceIntrospection::new(&client, "inst-1", &image);
        let err = introspection.get_userdata_executed_plugins().unwrap_err();
        assert!(format!("{err:#}").contains("'Access denied' is not a number"));
    }
}
