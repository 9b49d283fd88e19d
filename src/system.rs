//! Privileged system tweaks: refreshing sudo credentials, overwriting system
//! files from the profile and appending lines to /etc/environment.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use crate::exec::{CommandRunner, CommandSpec};
use crate::fsops;
use crate::placement::ConfigItem;
use crate::report::{Step, StepResult};

/// `[environment]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default = "default_environment_file")]
    pub file: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

fn default_environment_file() -> String {
    "/etc/environment".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self { file: default_environment_file(), lines: Vec::new() }
    }
}

/// Asks sudo for credentials up front so a slow package install later
/// doesn't time out halfway. Only sudo has a `-v`; other helpers are left
/// alone.
pub fn refresh_privileges(runner: &dyn CommandRunner, privilege: &str) -> Option<StepResult> {
    let program = privilege.split_whitespace().next()?;
    if program != "sudo" {
        return None;
    }
    let result = match runner.run_checked(&CommandSpec::new("sudo").arg("-v")) {
        Ok(_) => StepResult::success(Step::Privileges, "sudo", "credentials cached"),
        Err(e) => {
            error!("Sudo privileges are required: {e}");
            StepResult::failed(Step::Privileges, "sudo", e.to_string())
        }
    };
    Some(result)
}

/// Copies each source over its system target with the privilege command.
pub fn overwrite_system_files(
    runner: &dyn CommandRunner,
    privilege: &str,
    items: &[ConfigItem],
) -> Vec<StepResult> {
    items
        .iter()
        .map(|item| {
            let name = item.target.display().to_string();
            if !fsops::exists(&item.source) {
                return StepResult::skipped(
                    Step::SystemFiles,
                    name,
                    format!("source {} not found", item.source.display()),
                );
            }
            let cmd = CommandSpec::new("cp")
                .path_arg(&item.source)
                .path_arg(&item.target)
                .elevated(privilege);
            match runner.run_checked(&cmd) {
                Ok(_) => {
                    info!("{name} overwritten from {}", item.source.display());
                    StepResult::success(Step::SystemFiles, name, "overwritten")
                }
                Err(e) => {
                    error!("{e}");
                    StepResult::failed(Step::SystemFiles, name, e.to_string())
                }
            }
        })
        .collect()
}

/// Trimmed lines of `file`. A missing file has none; invalid UTF-8 is
/// replaced, not treated as unreadable.
fn existing_lines(file: &Path) -> io::Result<HashSet<String>> {
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(|l| l.trim().to_string())
        .collect())
}

/// Appends each line to `file` unless an identical line is already there.
/// If `file` exists but cannot be read, nothing is appended.
pub fn ensure_environment_lines(
    runner: &dyn CommandRunner,
    privilege: &str,
    file: &Path,
    lines: &[String],
) -> Vec<StepResult> {
    let mut present = match existing_lines(file) {
        Ok(present) => present,
        Err(e) => {
            error!("Failed to read {}: {e}", file.display());
            return lines
                .iter()
                .map(|line| {
                    StepResult::failed(
                        Step::Environment,
                        line.trim(),
                        format!("cannot read {}: {e}", file.display()),
                    )
                })
                .collect();
        }
    };

    lines
        .iter()
        .map(|line| {
            let wanted = line.trim();
            if present.contains(wanted) {
                info!("{wanted} already set in {}", file.display());
                return StepResult::skipped(Step::Environment, wanted, "already present");
            }
            let cmd = CommandSpec::new("tee")
                .arg("-a")
                .path_arg(file)
                .stdin(format!("{wanted}\n"))
                .quiet()
                .elevated(privilege);
            match runner.run_checked(&cmd) {
                Ok(_) => {
                    info!("Added {wanted} to {}", file.display());
                    present.insert(wanted.to_string());
                    let detail = format!("appended to {}", file.display());
                    StepResult::success(Step::Environment, wanted, detail)
                }
                Err(e) => {
                    error!("{e}");
                    StepResult::failed(Step::Environment, wanted, e.to_string())
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::report::Outcome;
    use tempfile::TempDir;

    #[test]
    fn environment_line_is_added_once() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join("environment");
        fs::write(&env, "EDITOR=nano\n").unwrap();
        let runner = ScriptedRunner::succeeding();
        let lines: Vec<String> = ["EDITOR=nano", "GTK_THEME=Arc-Dark", "GTK_THEME=Arc-Dark"]
            .map(String::from)
            .to_vec();

        let results = ensure_environment_lines(&runner, "sudo", &env, &lines);

        let outcomes: Vec<Outcome> = results.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Skipped, Outcome::Success, Outcome::Skipped]);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sudo");
        assert_eq!(calls[0].stdin.as_deref(), Some("GTK_THEME=Arc-Dark\n"));
    }

    #[test]
    fn non_utf8_environment_file_still_counts_existing_lines() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join("environment");
        fs::write(&env, b"# caf\xe9\nGTK_THEME=Arc-Dark\n").unwrap();
        let runner = ScriptedRunner::succeeding();

        let results =
            ensure_environment_lines(&runner, "sudo", &env, &["GTK_THEME=Arc-Dark".to_string()]);

        assert_eq!(results[0].outcome, Outcome::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn unreadable_environment_file_appends_nothing() {
        let tmp = TempDir::new().unwrap();
        // a directory exists but cannot be read as a file
        let env = tmp.path().join("environment");
        fs::create_dir_all(&env).unwrap();
        let runner = ScriptedRunner::succeeding();

        let results =
            ensure_environment_lines(&runner, "sudo", &env, &["GTK_THEME=Arc-Dark".to_string()]);

        assert_eq!(results[0].outcome, Outcome::Failed);
        assert!(results[0].detail.starts_with("cannot read"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_environment_file_gets_the_line() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::succeeding();
        let env = tmp.path().join("environment");

        let results =
            ensure_environment_lines(&runner, "sudo", &env, &["GTK_THEME=Arc-Dark".to_string()]);

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(runner.count_starting_with("sudo tee -a"), 1);
    }

    #[test]
    fn system_file_copy_is_privileged_and_skips_missing_sources() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("pacman.conf");
        fs::write(&src, "[options]").unwrap();
        let runner = ScriptedRunner::succeeding();

        let results = overwrite_system_files(
            &runner,
            "sudo",
            &[
                ConfigItem::file(&src, "/etc/pacman.conf"),
                ConfigItem::file(tmp.path().join("missing.conf"), "/etc/missing.conf"),
            ],
        );

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(results[1].outcome, Outcome::Skipped);
        assert_eq!(runner.lines(), vec![format!("sudo cp {} /etc/pacman.conf", src.display())]);
    }

    #[test]
    fn privilege_refresh_only_for_sudo() {
        let runner = ScriptedRunner::succeeding();
        assert!(refresh_privileges(&runner, "").is_none());
        assert!(refresh_privileges(&runner, "doas").is_none());
        let result = refresh_privileges(&runner, "sudo").unwrap();
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(runner.lines(), vec!["sudo -v"]);
    }
}
