use anyhow::Result;
use argus::config::Settings;
use argus::dhcp::{MTU_OPTION, NTP_SERVERS_OPTION};

pub(crate) fn run_dhcp(settings: &Settings) -> Result<()> {
    let dhcp = settings.dhcp.reader();
    println!("agent config: {}", dhcp.agent_config().display());
    println!("dnsmasq config: {}", dhcp.dnsmasq_config().display());
    if !dhcp.is_dnsmasq_configured() {
        println!("dnsmasq configured: no");
        return Ok(());
    }
    println!("dnsmasq configured: yes");
    for (label, option) in [("ntp servers", NTP_SERVERS_OPTION), ("mtu", MTU_OPTION)] {
        let value = dhcp.get_dhcp_override(option)?;
        println!(
            "{label} (option {option}): {}",
            value.as_deref().unwrap_or("not set")
        );
    }
    Ok(())
}
