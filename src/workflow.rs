//! The provisioning sequence.
//!
//! Steps run strictly in order and never loop back. Item failures are
//! recorded in the [`Report`] and the run carries on; the only thing one step
//! hands to another is the [`BackupSnapshot`].

use colored::*;
use tracing::warn;

use crate::backup::{self, BackupSnapshot};
use crate::commands;
use crate::config::Config;
use crate::exec::CommandRunner;
use crate::fetch;
use crate::packages::{PackageSync, Tier};
use crate::placement::{self, OverwriteMode, Placement};
use crate::report::Report;
use crate::services::ServiceManager;
use crate::system;

pub struct Workflow<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
}

fn banner(text: &str) {
    println!("\n{}", text.blue().bold());
}

impl<'a> Workflow<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn run(&self) -> Report {
        let mut report = Report::default();
        let privilege = self.config.privilege_command.as_str();

        if let Some(result) = system::refresh_privileges(self.runner, privilege) {
            report.push(result);
        }

        let snapshot = self.backup(&mut report);
        self.system_files(&mut report);
        self.packages(&mut report);
        self.assets(&mut report);
        self.placement(&snapshot, &mut report);
        self.environment(&mut report);
        self.services(&mut report);
        self.commands(&mut report);

        report
    }

    fn backup(&self, report: &mut Report) -> BackupSnapshot {
        let items = self.config.backup_items();
        let root = self.config.backup_root();
        if items.is_empty() {
            return BackupSnapshot::empty(root, self.config.backup.mode);
        }
        banner("💾 Backing up configuration...");
        let (snapshot, results) =
            backup::backup(&items, self.config.backup.mode, &root, &self.config.backup.prefix);
        report.extend(results);
        snapshot
    }

    fn system_files(&self, report: &mut Report) {
        let items = self.config.system_files();
        if items.is_empty() {
            return;
        }
        banner("🛠️  Overwriting system files...");
        report.extend(system::overwrite_system_files(
            self.runner,
            &self.config.privilege_command,
            &items,
        ));
    }

    fn packages(&self, report: &mut Report) {
        let settings = &self.config.packages;
        let sync = PackageSync::new(self.runner, settings, &self.config.privilege_command);

        let required = settings.specs(Tier::Required);
        if !required.is_empty() {
            banner("📦 Checking required packages...");
            report.extend(sync.sync(&required));
        }

        let optional = settings.specs(Tier::Optional);
        if optional.is_empty() {
            return;
        }
        banner("📦 Checking optional packages...");
        let helper = match &self.config.helper {
            Some(helper) => fetch::ensure_helper_installer(self.runner, &sync, helper),
            None => {
                warn!("No [helper] configured, optional packages cannot be installed");
                report.extend(sync.unavailable(&optional, "no helper installer configured"));
                return;
            }
        };
        let helper_ok = !helper.is_failed();
        let reason = format!("{} unavailable: {}", helper.name, helper.detail);
        report.push(helper);

        if helper_ok {
            report.extend(sync.sync(&optional));
        } else {
            report.extend(sync.unavailable(&optional, &reason));
        }
    }

    fn assets(&self, report: &mut Report) {
        if self.config.assets.is_empty() {
            return;
        }
        banner("🎨 Fetching third-party assets...");
        for asset in &self.config.assets {
            report.push(fetch::fetch_and_run(self.runner, asset));
        }
    }

    fn placement(&self, snapshot: &BackupSnapshot, report: &mut Report) {
        banner("🔗 Placing dotfiles...");
        if self.config.placement.overwrite == OverwriteMode::Replace {
            for target in self.config.unprotected_targets() {
                warn!(
                    "{} is not in [backup].items and will be replaced without a backup",
                    target.display()
                );
            }
        }
        report.extend(placement::create_folders(&self.config.folders_to_create()));

        let placer = Placement::new(self.config.placement.overwrite, snapshot);
        report.extend(placer.place_files(&self.config.placement_files()));
        report.extend(placer.place_folders(&self.config.placement_folders()));
        report.extend(placement::make_executable(&self.config.executables()));
    }

    fn environment(&self, report: &mut Report) {
        let lines = &self.config.environment.lines;
        if lines.is_empty() {
            return;
        }
        banner("🌱 Setting environment...");
        report.extend(system::ensure_environment_lines(
            self.runner,
            &self.config.privilege_command,
            &self.config.environment_file(),
            lines,
        ));
    }

    fn services(&self, report: &mut Report) {
        let names = &self.config.services.names;
        if names.is_empty() {
            return;
        }
        banner("⚙️  Enabling services...");
        let manager = ServiceManager::new(self.runner, &self.config.privilege_command);
        for name in names {
            report.push(manager.ensure_running(name));
        }
    }

    fn commands(&self, report: &mut Report) {
        if self.config.commands.is_empty() {
            return;
        }
        banner("🧩 Running setup commands...");
        for command in &self.config.commands {
            report.push(commands::run_command(
                self.runner,
                &self.config.privilege_command,
                command,
            ));
        }
    }
}
