use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, warn};

use crate::check::{DNSMASQ_SKIP_REASON, Outcome, Precondition};
use crate::config::{ScenarioSettings, Settings};
use crate::dhcp::DhcpConfig;
use crate::introspection;
use crate::manager::InstanceManager;
use crate::scenario::{Provisioner, Scenario, build_scenario, save_instance_output};
use crate::smoke::SmokeContext;

#[derive(Debug)]
pub struct CheckRecord {
    pub scenario: String,
    pub suite: &'static str,
    pub check: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct TestReport {
    pub started_at: OffsetDateTime,
    pub duration: Duration,
    pub records: Vec<CheckRecord>,
    /// Scenarios that never reached their checks, with the reason.
    pub scenario_errors: Vec<(String, String)>,
}

impl TestReport {
    fn new() -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            duration: Duration::ZERO,
            records: Vec::new(),
            scenario_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn tests_run(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed(_)))
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Errored(_))) + self.scenario_errors.len()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped(_)))
    }

    #[must_use]
    pub fn was_successful(&self) -> bool {
        self.failures() == 0 && self.errors() == 0
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|record| predicate(&record.outcome))
            .count()
    }

    /// `OK` or `FAILED`, followed by the non-zero counters.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut counters = Vec::new();
        for (label, value) in [
            ("failures", self.failures()),
            ("errors", self.errors()),
            ("skipped", self.skipped()),
        ] {
            if value > 0 {
                counters.push(format!("{label}={value}"));
            }
        }
        let mut summary = String::from(if self.was_successful() { "OK" } else { "FAILED" });
        if !counters.is_empty() {
            summary.push_str(&format!(" ({})", counters.join(", ")));
        }
        summary
    }

    fn log(&self) {
        let started = self
            .started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.started_at.to_string());
        let elapsed = Duration::from_millis(
            u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        );
        info!(
            "Ran {} tests in {} (started {started})",
            self.tests_run(),
            humantime::format_duration(elapsed)
        );
        if self.was_successful() {
            info!("{}", self.summary());
        } else {
            error!("{}", self.summary());
        }
    }
}

/// Provisions each scenario and runs its suites against the instance.
pub struct Runner<'a> {
    settings: &'a Settings,
    dhcp: DhcpConfig,
    provisioner: &'a dyn Provisioner,
    instance_output: Option<PathBuf>,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub fn new(settings: &'a Settings, provisioner: &'a dyn Provisioner) -> Self {
        Self {
            settings,
            dhcp: settings.dhcp.reader(),
            provisioner,
            instance_output: settings.argus.instance_output.clone(),
        }
    }

    /// Directory receiving `<instance id>.log` console archives.
    #[must_use]
    pub fn instance_output(mut self, dir: Option<PathBuf>) -> Self {
        self.instance_output = dir;
        self
    }

    /// Runs every scenario in order and logs the summary.
    #[must_use]
    pub fn run(&self, scenarios: &[(&str, &ScenarioSettings)]) -> TestReport {
        let mut report = TestReport::new();
        let start = Instant::now();
        let dnsmasq_configured = self.dhcp.is_dnsmasq_configured();
        if !dnsmasq_configured {
            warn!("{DNSMASQ_SKIP_REASON}");
        }

        for (name, scenario) in scenarios {
            if let Err(err) = self.run_scenario(name, scenario, dnsmasq_configured, &mut report) {
                error!("Scenario {name} errored: {err:#}");
                report
                    .scenario_errors
                    .push(((*name).to_string(), format!("{err:#}")));
            }
        }

        report.duration = start.elapsed();
        report.log();
        report
    }

    fn run_scenario(
        &self,
        name: &str,
        settings: &ScenarioSettings,
        dnsmasq_configured: bool,
        report: &mut TestReport,
    ) -> Result<()> {
        let scenario = build_scenario(self.settings, name, settings)?;
        info!(
            "Running scenario {name} on image {} ({})",
            scenario.image.name, scenario.image.os_type
        );
        let manager = self.provisioner.provision(&scenario)?;
        let result = self.run_suites(&scenario, manager.as_ref(), dnsmasq_configured, report);
        if let Err(err) = manager.cleanup() {
            warn!(
                "Failed to clean up instance {}: {err:#}",
                manager.instance_id()
            );
        }
        result
    }

    fn run_suites(
        &self,
        scenario: &Scenario,
        manager: &dyn InstanceManager,
        dnsmasq_configured: bool,
        report: &mut TestReport,
    ) -> Result<()> {
        if let Some(dir) = &self.instance_output
            && let Err(err) = save_instance_output(manager, dir)
        {
            warn!("Failed to save console output: {err:#}");
        }

        let introspection = introspection::for_image(manager, &scenario.image)?;
        let ctx = SmokeContext {
            manager,
            introspection: introspection.as_ref(),
            image: &scenario.image,
            cloudbaseinit: &self.settings.cloudbaseinit,
            dhcp: &self.dhcp,
        };

        for suite in &scenario.suites {
            for check in suite.checks() {
                let outcome = if check.precondition == Precondition::DnsmasqConfigured
                    && !dnsmasq_configured
                {
                    Outcome::Skipped(DNSMASQ_SKIP_REASON)
                } else {
                    Outcome::from((check.run)(&ctx))
                };
                log_outcome(&scenario.name, suite.name(), check.name, &outcome);
                report.records.push(CheckRecord {
                    scenario: scenario.name.clone(),
                    suite: suite.name(),
                    check: check.name,
                    outcome,
                });
            }
        }
        Ok(())
    }
}

fn log_outcome(scenario: &str, suite: &str, check: &str, outcome: &Outcome) {
    let label = outcome.label();
    match outcome {
        Outcome::Passed => info!("{check} ({scenario}.{suite}) ... {label}"),
        Outcome::Skipped(reason) => info!("{check} ({scenario}.{suite}) ... {label}: {reason}"),
        Outcome::Failed(message) | Outcome::Errored(message) => {
            error!("{check} ({scenario}.{suite}) ... {label}: {message}");
        }
    }
}
