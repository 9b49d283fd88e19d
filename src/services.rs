//! Service enablement through systemctl.

use serde::Deserialize;
use tracing::{error, info};

use crate::exec::{CommandRunner, CommandSpec, ExecError};
use crate::report::{Step, StepResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesConfig {
    #[serde(default)]
    pub names: Vec<String>,
}

pub struct ServiceManager<'a> {
    runner: &'a dyn CommandRunner,
    privilege: &'a str,
}

impl<'a> ServiceManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, privilege: &'a str) -> Self {
        Self { runner, privilege }
    }

    fn systemctl(&self, verb: &str, name: &str) -> CommandSpec {
        CommandSpec::new("systemctl").args([verb, name])
    }

    pub fn enable(&self, name: &str) -> Result<(), ExecError> {
        let cmd = self.systemctl("enable", name).elevated(self.privilege);
        self.runner.run_checked(&cmd).map(|_| ())
    }

    pub fn start(&self, name: &str) -> Result<(), ExecError> {
        let cmd = self.systemctl("start", name).elevated(self.privilege);
        self.runner.run_checked(&cmd).map(|_| ())
    }

    /// Anything but a clean "active" answer, including a failed query,
    /// counts as not active.
    pub fn is_active(&self, name: &str) -> bool {
        let cmd = CommandSpec::new("systemctl")
            .args(["is-active", "--quiet", name])
            .quiet();
        self.runner.probe(&cmd)
    }

    /// Enables `name` and starts it unless it is already running.
    pub fn ensure_running(&self, name: &str) -> StepResult {
        let mut problems = Vec::new();
        if let Err(e) = self.enable(name) {
            error!("Failed to enable {name}: {e}");
            problems.push(e.to_string());
        }

        let action = if self.is_active(name) {
            info!("{name} is already active");
            "already active"
        } else {
            info!("{name} is not active, starting it");
            match self.start(name) {
                Ok(()) => "started",
                Err(e) => {
                    error!("Failed to start {name}: {e}");
                    problems.push(e.to_string());
                    "start failed"
                }
            }
        };

        if problems.is_empty() {
            StepResult::success(Step::Services, name, format!("enabled, {action}"))
        } else {
            StepResult::failed(Step::Services, name, problems.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::report::Outcome;

    fn service_runner(active: bool) -> ScriptedRunner {
        ScriptedRunner::new(move |cmd| {
            if cmd.args.first().map(String::as_str) == Some("is-active") {
                if active { 0 } else { 3 }
            } else {
                0
            }
        })
    }

    #[test]
    fn active_service_is_enabled_but_not_started() {
        let runner = service_runner(true);
        let result = ServiceManager::new(&runner, "sudo").ensure_running("sshd");

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.detail, "enabled, already active");
        assert_eq!(runner.count_starting_with("sudo systemctl enable sshd"), 1);
        assert_eq!(runner.count_starting_with("sudo systemctl start"), 0);
    }

    #[test]
    fn inactive_service_is_enabled_and_started() {
        let runner = service_runner(false);
        let result = ServiceManager::new(&runner, "sudo").ensure_running("nxserver");

        assert_eq!(result.detail, "enabled, started");
        assert_eq!(
            runner.lines(),
            vec![
                "sudo systemctl enable nxserver",
                "systemctl is-active --quiet nxserver",
                "sudo systemctl start nxserver",
            ]
        );
    }

    #[test]
    fn failed_enable_still_attempts_start_and_fails_the_item() {
        let runner = ScriptedRunner::new(|cmd| match cmd.args.first().map(String::as_str) {
            Some("enable") => 1,
            Some("is-active") => 3,
            _ => 0,
        });
        let result = ServiceManager::new(&runner, "sudo").ensure_running("sshd");
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(runner.count_starting_with("sudo systemctl start sshd"), 1);
    }
}
