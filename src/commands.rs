//! Post-install commands from `[[commands]]`, run after services.
//!
//! Each one is a single argv, optionally run through the privilege command.
//! An `unless` probe that exits 0 marks the command as already done, which
//! keeps reruns from repeating one-shot setup like `netbird service install`.

use serde::Deserialize;
use tracing::{error, info};

use crate::exec::{CommandRunner, CommandSpec};
use crate::report::{Step, StepResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    /// Shown in the report; defaults to the argv.
    #[serde(default)]
    pub name: Option<String>,
    pub argv: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub unless: Option<Vec<String>>,
}

fn default_required() -> bool {
    true
}

impl CommandConfig {
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.argv.join(" "))
    }
}

pub fn run_command(
    runner: &dyn CommandRunner,
    privilege: &str,
    command: &CommandConfig,
) -> StepResult {
    let name = command.label();

    if let Some(probe) = &command.unless {
        if runner.probe(&CommandSpec::from_argv(probe).quiet()) {
            info!("{name}: already done");
            return StepResult::skipped(Step::Commands, name, "already done")
                .required(command.required);
        }
    }

    let mut cmd = CommandSpec::from_argv(&command.argv);
    if command.privileged {
        cmd = cmd.elevated(privilege);
    }
    let result = match runner.run_checked(&cmd) {
        Ok(_) => {
            info!("{name}: done");
            StepResult::success(Step::Commands, name, "ran")
        }
        Err(e) => {
            error!("{name}: {e}");
            StepResult::failed(Step::Commands, name, e.to_string())
        }
    };
    result.required(command.required)
}
