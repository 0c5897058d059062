use std::fmt::Debug;

use thiserror::Error;

use crate::smoke::SmokeContext;

/// Why a single check did not pass.
///
/// A `Failed` check observed state that does not match the expectation.
/// An `Errored` check could not observe the state at all (I/O, remote
/// command, parse problems).
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Errored(#[from] anyhow::Error),
}

pub type CheckResult = Result<(), CheckError>;

/// Gate evaluated once before a suite runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Always,
    DnsmasqConfigured,
}

pub const DNSMASQ_SKIP_REASON: &str = "Test will fail if the `dhcp-option-force` option \
    was not configured by the `dnsmasq_config_file` from neutron/dhcp-agent.ini.";

pub type CheckFn = fn(&SmokeContext<'_>) -> CheckResult;

/// A named assertion unit of a suite.
pub struct Check {
    pub name: &'static str,
    pub precondition: Precondition,
    pub run: CheckFn,
}

impl Check {
    #[must_use]
    pub fn new(name: &'static str, run: CheckFn) -> Self {
        Self::with_precondition(name, Precondition::Always, run)
    }

    #[must_use]
    pub fn with_precondition(name: &'static str, precondition: Precondition, run: CheckFn) -> Self {
        Self {
            name,
            precondition,
            run,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Passed,
    Failed(String),
    Errored(String),
    Skipped(&'static str),
}

impl Outcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "ok",
            Outcome::Failed(_) => "FAIL",
            Outcome::Errored(_) => "ERROR",
            Outcome::Skipped(_) => "skipped",
        }
    }
}

impl From<CheckResult> for Outcome {
    fn from(result: CheckResult) -> Self {
        match result {
            Ok(()) => Outcome::Passed,
            Err(CheckError::Failed(message)) => Outcome::Failed(message),
            Err(CheckError::Errored(err)) => Outcome::Errored(format!("{err:#}")),
        }
    }
}

pub(crate) fn fail(message: impl Into<String>) -> CheckError {
    CheckError::Failed(message.into())
}

pub(crate) fn ensure(condition: bool, message: impl Into<String>) -> CheckResult {
    if condition {
        Ok(())
    } else {
        Err(fail(message))
    }
}

pub(crate) fn ensure_eq<T>(what: &str, expected: &T, actual: &T) -> CheckResult
where
    T: PartialEq + Debug + ?Sized,
{
    if expected == actual {
        return Ok(());
    }
    Err(fail(format!(
        "{what}: expected {expected:?}, got {actual:?}"
    )))
}
