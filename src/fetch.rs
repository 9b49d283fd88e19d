//! Third-party fetches: bootstrapping the helper installer from its build
//! recipe and running theme installers cloned from git.
//!
//! Both pass the clone directory to the subprocess as its working directory,
//! so nothing here touches the process cwd.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::expand_path;
use crate::exec::{CommandRunner, CommandSpec};
use crate::fsops;
use crate::packages::PackageSync;
use crate::report::{Step, StepResult};

/// `[helper]` section: where the helper installer comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelperConfig {
    pub package: String,
    pub repo: String,
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    #[serde(default = "default_build")]
    pub build: Vec<String>,
}

fn default_build_dir() -> String {
    "/tmp/paru".to_string()
}

fn default_build() -> Vec<String> {
    vec!["makepkg".into(), "-si".into(), "--noconfirm".into()]
}

/// One `[[assets]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    pub name: String,
    pub repo: String,
    pub target: String,
    pub entrypoint: String,
    #[serde(default = "default_shallow")]
    pub shallow: bool,
}

fn default_shallow() -> bool {
    true
}

impl AssetConfig {
    pub fn target_dir(&self) -> PathBuf {
        expand_path(&self.target)
    }
}

fn git_clone(repo: &str, dest: &std::path::Path, shallow: bool) -> CommandSpec {
    let mut cmd = CommandSpec::new("git").arg("clone");
    if shallow {
        cmd = cmd.arg("--depth=1");
    }
    cmd.arg(repo).path_arg(dest)
}

/// Makes sure the helper installer is present, building it from its recipe
/// repository if it is not.
pub fn ensure_helper_installer(
    runner: &dyn CommandRunner,
    packages: &PackageSync<'_>,
    helper: &HelperConfig,
) -> StepResult {
    let name = helper.package.as_str();
    if packages.is_installed(name) {
        info!("{name} is already installed");
        return StepResult::skipped(Step::Helper, name, "already installed");
    }

    info!("{name} is not installed, bootstrapping it from {}", helper.repo);
    let build_dir = expand_path(&helper.build_dir);
    if fsops::exists(&build_dir) {
        if let Err(e) = fsops::remove_path(&build_dir) {
            return StepResult::failed(Step::Helper, name, format!("{e:#}"));
        }
    }

    if let Err(e) = runner.run_checked(&git_clone(&helper.repo, &build_dir, false)) {
        error!("{e}");
        return StepResult::failed(Step::Helper, name, e.to_string());
    }

    let build = CommandSpec::from_argv(&helper.build).current_dir(&build_dir);
    if let Err(e) = runner.run_checked(&build) {
        // build dir is left in place for inspection
        error!("Failed to build {name}: {e}");
        return StepResult::failed(Step::Helper, name, e.to_string());
    }

    if let Err(e) = fsops::remove_path(&build_dir) {
        warn!("Could not clean up {}: {e:#}", build_dir.display());
    }

    if packages.is_installed(name) {
        StepResult::success(Step::Helper, name, format!("built from {}", helper.repo))
    } else {
        StepResult::failed(Step::Helper, name, "build finished but the package is not installed")
    }
}

/// Clones `asset.repo` and runs its entrypoint once. An existing target
/// directory counts as done; it is not re-validated against the remote.
pub fn fetch_and_run(runner: &dyn CommandRunner, asset: &AssetConfig) -> StepResult {
    let name = asset.name.as_str();
    let target = asset.target_dir();

    if fsops::exists(&target) {
        info!("{} already exists, skipping {name}", target.display());
        return StepResult::skipped(
            Step::Assets,
            name,
            format!("{} already fetched", target.display()),
        );
    }

    if let Err(e) = runner.run_checked(&git_clone(&asset.repo, &target, asset.shallow)) {
        error!("{e}");
        return StepResult::failed(Step::Assets, name, e.to_string());
    }

    let script = target.join(&asset.entrypoint);
    if !script.is_file() {
        return StepResult::failed(
            Step::Assets,
            name,
            format!("entrypoint {} not found after clone", script.display()),
        );
    }
    if let Err(e) = fsops::set_mode(&script, 0o755) {
        return StepResult::failed(Step::Assets, name, format!("{e:#}"));
    }

    let run = CommandSpec::new(script.to_string_lossy()).current_dir(&target);
    match runner.run_checked(&run) {
        Ok(_) => StepResult::success(Step::Assets, name, format!("ran {}", asset.entrypoint)),
        Err(e) => {
            error!("{e}");
            StepResult::failed(Step::Assets, name, e.to_string())
        }
    }
}
