//! Package sync.
//!
//! Queries the system package database one name at a time and installs only
//! what is missing. Required packages go through the privileged system
//! installer, optional ones through the user-level helper (paru).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::exec::{CommandRunner, CommandSpec};
use crate::report::{Step, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Required,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub tier: Tier,
}

impl PackageSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), tier: Tier::Required }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self { name: name.into(), tier: Tier::Optional }
    }
}

/// `[packages]` section of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagesConfig {
    #[serde(default = "default_query")]
    pub query: Vec<String>,
    /// Run through the privilege command.
    #[serde(default = "default_install")]
    pub install: Vec<String>,
    /// Run as the invoking user; the helper escalates on its own.
    #[serde(default = "default_helper_install")]
    pub helper_install: Vec<String>,
    /// One installer call per tier instead of one per package.
    #[serde(default)]
    pub batch: bool,
    /// Whether optional packages that fail to install fail the run.
    #[serde(default)]
    pub optional_failures_fatal: bool,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

fn default_query() -> Vec<String> {
    vec!["pacman".into(), "-Q".into()]
}

fn default_install() -> Vec<String> {
    vec!["pacman".into(), "-S".into(), "--needed".into(), "--noconfirm".into()]
}

fn default_helper_install() -> Vec<String> {
    vec!["paru".into(), "-S".into(), "--needed".into(), "--noconfirm".into()]
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            install: default_install(),
            helper_install: default_helper_install(),
            batch: false,
            optional_failures_fatal: false,
            required: Vec::new(),
            optional: Vec::new(),
        }
    }
}

impl PackagesConfig {
    pub fn specs(&self, tier: Tier) -> Vec<PackageSpec> {
        let names = match tier {
            Tier::Required => &self.required,
            Tier::Optional => &self.optional,
        };
        names
            .iter()
            .map(|name| PackageSpec { name: name.clone(), tier })
            .collect()
    }
}

pub struct PackageSync<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a PackagesConfig,
    privilege: &'a str,
}

impl<'a> PackageSync<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        settings: &'a PackagesConfig,
        privilege: &'a str,
    ) -> Self {
        Self { runner, settings, privilege }
    }

    pub fn is_installed(&self, name: &str) -> bool {
        let query = CommandSpec::from_argv(&self.settings.query).arg(name).quiet();
        self.runner.probe(&query)
    }

    fn installer(&self, tier: Tier) -> CommandSpec {
        match tier {
            Tier::Required => {
                CommandSpec::from_argv(&self.settings.install).elevated(self.privilege)
            }
            Tier::Optional => CommandSpec::from_argv(&self.settings.helper_install),
        }
    }

    fn counts(&self, tier: Tier) -> bool {
        tier == Tier::Required || self.settings.optional_failures_fatal
    }

    /// Installs whatever in `specs` is missing. Running it again with the
    /// same list issues no install calls.
    pub fn sync(&self, specs: &[PackageSpec]) -> Vec<StepResult> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        let mut results = Vec::new();

        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                continue;
            }
            if self.is_installed(&spec.name) {
                debug!("{} is already installed", spec.name);
                results.push(
                    StepResult::skipped(Step::Packages, &spec.name, "already installed")
                        .required(self.counts(spec.tier)),
                );
            } else {
                info!("{} is not installed", spec.name);
                missing.push(spec);
            }
        }

        if self.settings.batch {
            for tier in [Tier::Required, Tier::Optional] {
                let group: Vec<&PackageSpec> =
                    missing.iter().copied().filter(|s| s.tier == tier).collect();
                results.extend(self.install_batch(tier, &group));
            }
        } else {
            for spec in missing {
                results.push(self.install_one(spec));
            }
        }
        results
    }

    fn install_one(&self, spec: &PackageSpec) -> StepResult {
        info!("Installing {}...", spec.name);
        let cmd = self.installer(spec.tier).arg(&spec.name);
        let result = match self.runner.run_checked(&cmd) {
            Ok(_) => StepResult::success(Step::Packages, &spec.name, "installed"),
            Err(e) => {
                error!("Failed to install {}: {e}", spec.name);
                StepResult::failed(Step::Packages, &spec.name, e.to_string())
            }
        };
        result.required(self.counts(spec.tier))
    }

    /// One installer call for the whole group, then a re-query per package so
    /// a partial failure is attributed to the right names.
    fn install_batch(&self, tier: Tier, group: &[&PackageSpec]) -> Vec<StepResult> {
        if group.is_empty() {
            return Vec::new();
        }
        let names: Vec<&str> = group.iter().map(|s| s.name.as_str()).collect();
        info!("Installing {} package(s): {}", names.len(), names.join(" "));
        let cmd = self.installer(tier).args(&names);
        let failure = self.runner.run_checked(&cmd).err().map(|e| {
            error!("{e}");
            e.to_string()
        });

        group
            .iter()
            .map(|spec| {
                let result = if self.is_installed(&spec.name) {
                    StepResult::success(Step::Packages, &spec.name, "installed")
                } else {
                    let detail = failure.clone().unwrap_or_else(|| {
                        "installer succeeded but package is still missing".to_string()
                    });
                    StepResult::failed(Step::Packages, &spec.name, detail)
                };
                result.required(self.counts(spec.tier))
            })
            .collect()
    }

    /// Marks every spec as not attempted, used when the helper installer is
    /// unavailable.
    pub fn unavailable(&self, specs: &[PackageSpec], reason: &str) -> Vec<StepResult> {
        let mut seen = HashSet::new();
        specs
            .iter()
            .filter(|s| seen.insert(s.name.as_str()))
            .map(|s| {
                StepResult::failed(Step::Packages, &s.name, format!("not attempted: {reason}"))
                    .required(self.counts(s.tier))
            })
            .collect()
    }
}
