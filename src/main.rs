//! dots-install
//!
//! Provisions a qtile desktop on Arch Linux from a personal dotfiles profile.
//! Reads `~/.config/dots-installer/config.toml` (or the built-in profile),
//! asks once for confirmation, then backs up, installs, copies and enables
//! everything in a single pass.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::*;

use dots_installer::config::{self, Config};
use dots_installer::exec::SystemRunner;
use dots_installer::logging;
use dots_installer::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(name = "dots-install", version, about = "Provision a desktop from a dotfiles profile")]
struct Cli {
    /// Config file (defaults to ~/.config/dots-installer/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Don't ask for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Write the per-item report as JSON to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Print the built-in profile and exit
    #[arg(long)]
    print_config: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "❌".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if cli.print_config {
        print!("{}", config::DEFAULT_CONFIG);
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config.as_deref())?;
    println!("{}", "🚀 Starting dotfiles provisioning...".green().bold());

    if !cli.yes {
        // no tty means no answer, which means no
        let proceed =
            inquire::Confirm::new("Back up, install and overwrite your configuration now?")
                .with_default(true)
                .prompt()
                .unwrap_or(false);
        if !proceed {
            println!("{}", "Nothing changed.".yellow());
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = Workflow::new(&config, &SystemRunner).run();
    report.print_summary();

    if let Some(path) = &cli.report {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    let code = report.exit_code();
    if code == 0 {
        let done = "✅ Provisioning complete! Log out and back in to pick up the new session.";
        println!("\n{}", done.green().bold());
    } else {
        let partial = "⚠️  Provisioning finished with failures. Fix them and run again.";
        println!("\n{}", partial.yellow().bold());
    }
    Ok(ExitCode::from(code))
}
