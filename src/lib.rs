//! Desktop provisioning from a dotfiles profile.
//!
//! One run takes a machine from "base install + git" to a configured qtile
//! desktop:
//! 1. **Backup:** snapshot the live config paths into a timestamped directory.
//! 2. **Packages:** install missing `pacman` packages, bootstrap `paru` from the
//!    AUR and install the optional ones through it.
//! 3. **Assets:** clone and run third-party theme installers (once).
//! 4. **Placement:** copy dotfiles and folders from the profile into `$HOME`.
//! 5. **Services:** enable and start system services, then run any extra
//!    setup commands.
//!
//! Nothing aborts halfway. Every item ends up in a [`report::Report`] and the
//! exit code says whether any required item failed.

pub mod backup;
pub mod commands;
pub mod config;
pub mod exec;
pub mod fetch;
pub mod fsops;
pub mod logging;
pub mod packages;
pub mod placement;
pub mod report;
pub mod services;
pub mod system;
pub mod workflow;
