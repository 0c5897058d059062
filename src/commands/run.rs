use anyhow::Result;
use argus::config::Settings;
use argus::replay::ReplayProvisioner;
use argus::runner::Runner;
use argus::scenario::select_scenarios;
use tracing::{info, warn};

use crate::RunArgs;

pub(crate) fn run_smoke(settings: &Settings, args: &RunArgs) -> Result<()> {
    let scenarios = select_scenarios(settings, &args.filter.filter());
    if scenarios.is_empty() {
        warn!("No scenarios selected; nothing to run");
        return Ok(());
    }
    info!(
        "Replaying {} scenario(s) from {}",
        scenarios.len(),
        args.transcripts.display()
    );

    let provisioner = ReplayProvisioner::new(args.transcripts.clone());
    let mut runner = Runner::new(settings, &provisioner);
    if let Some(dir) = &args.instance_output {
        runner = runner.instance_output(Some(dir.clone()));
    }
    let report = runner.run(&scenarios);
    if !report.was_successful() {
        anyhow::bail!("Smoke tests failed: {}", report.summary());
    }
    Ok(())
}
