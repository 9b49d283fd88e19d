//! Per-item outcomes and the end-of-run summary.

use std::fmt;

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Privileges,
    Backup,
    SystemFiles,
    Packages,
    Helper,
    Assets,
    Folders,
    Files,
    Executables,
    Environment,
    Services,
    Commands,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Privileges => "privileges",
            Step::Backup => "backup",
            Step::SystemFiles => "system files",
            Step::Packages => "packages",
            Step::Helper => "helper installer",
            Step::Assets => "assets",
            Step::Folders => "folders",
            Step::Files => "files",
            Step::Executables => "executables",
            Step::Environment => "environment",
            Step::Services => "services",
            Step::Commands => "commands",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Skipped,
    Failed,
}

/// What happened to one item (a path, a package, a service) in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: Step,
    pub name: String,
    pub outcome: Outcome,
    pub detail: String,
    /// Failures of required items decide the exit code.
    pub required: bool,
}

impl StepResult {
    fn new(
        step: Step,
        name: impl Into<String>,
        outcome: Outcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            step,
            name: name.into(),
            outcome,
            detail: detail.into(),
            required: true,
        }
    }

    pub fn success(step: Step, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(step, name, Outcome::Success, detail)
    }

    pub fn skipped(step: Step, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(step, name, Outcome::Skipped, detail)
    }

    pub fn failed(step: Step, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(step, name, Outcome::Failed, detail)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    results: Vec<StepResult>,
}

impl Report {
    pub fn push(&mut self, result: StepResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn failed_required(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.is_failed() && r.required)
    }

    /// 0 when every required item succeeded or was skipped, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.failed_required().next().is_some() { 1 } else { 0 }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn print_summary(&self) {
        println!("\n{}", "📋 Summary".blue().bold());
        for result in self.results.iter().filter(|r| r.outcome != Outcome::Success) {
            let marker = match (result.outcome, result.required) {
                (Outcome::Failed, true) => "❌".to_string(),
                (Outcome::Failed, false) => "⚠️ ".to_string(),
                _ => "⏭️ ".to_string(),
            };
            let line = format!("   {marker} [{}] {}: {}", result.step, result.name, result.detail);
            match result.outcome {
                Outcome::Failed => println!("{}", line.red()),
                _ => println!("{}", line.dimmed()),
            }
        }
        println!(
            "   {} succeeded, {} skipped, {} failed",
            self.count(Outcome::Success).to_string().green(),
            self.count(Outcome::Skipped).to_string().yellow(),
            self.count(Outcome::Failed).to_string().red(),
        );
    }
}

impl Extend<StepResult> for Report {
    fn extend<I: IntoIterator<Item = StepResult>>(&mut self, iter: I) {
        self.results.extend(iter);
    }
}
