//! Profile configuration.
//!
//! Lives at `~/.config/dots-installer/config.toml`. When that file is absent
//! the embedded default profile is used, so a fresh machine can be
//! provisioned with no setup beyond cloning the dotfiles.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::backup::BackupMode;
use crate::commands::CommandConfig;
use crate::fetch::{AssetConfig, HelperConfig};
use crate::packages::PackagesConfig;
use crate::placement::{ConfigItem, OverwriteMode};
use crate::services::ServicesConfig;
use crate::system::EnvironmentConfig;

pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Expands shell-style paths like `~/` to absolute system paths.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Prefix for privileged commands. Empty when already running as root.
    #[serde(default = "default_privilege")]
    pub privilege_command: String,
    pub profile: ProfileConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub system_files: Vec<PathPair>,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub helper: Option<HelperConfig>,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

fn default_privilege() -> String {
    "sudo".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub root: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub mode: BackupMode,
    #[serde(default)]
    pub items: Vec<String>,
}

fn default_prefix() -> String {
    "backup".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathPair {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacementConfig {
    #[serde(default)]
    pub overwrite: OverwriteMode,
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub executables: Vec<String>,
    #[serde(default)]
    pub files: Vec<PathPair>,
    #[serde(default)]
    pub folders: Vec<PathPair>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("dots-installer/config.toml"))
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG).context("Embedded default config is invalid")
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// An explicit path must exist; the default path falls back to the
    /// embedded profile.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    return Self::embedded();
                }
                path
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let commands = [
            ("packages.query", &self.packages.query),
            ("packages.install", &self.packages.install),
            ("packages.helper_install", &self.packages.helper_install),
        ];
        for (key, argv) in commands {
            if argv.first().is_none_or(|p| p.trim().is_empty()) {
                bail!("'{key}' must name a program");
            }
        }
        if let Some(helper) = &self.helper {
            if helper.build.is_empty() {
                bail!("'helper.build' must name a program");
            }
        }
        for asset in &self.assets {
            if asset.entrypoint.trim().is_empty() {
                bail!("asset '{}' has an empty entrypoint", asset.name);
            }
        }
        for command in &self.commands {
            if command.argv.first().is_none_or(|p| p.trim().is_empty()) {
                bail!("a [[commands]] entry has an empty argv");
            }
            if command.unless.as_ref().is_some_and(|probe| probe.is_empty()) {
                bail!("command '{}' has an empty 'unless'", command.label());
            }
        }
        Ok(())
    }

    /// Resolves a profile-relative path. Absolute and `~/` paths pass
    /// through untouched.
    pub fn profile_path(&self, path: &str) -> PathBuf {
        let expanded = expand_path(path);
        if expanded.is_absolute() {
            expanded
        } else {
            expand_path(&self.profile.root).join(expanded)
        }
    }

    pub fn backup_root(&self) -> PathBuf {
        expand_path(&self.backup.root)
    }

    pub fn backup_items(&self) -> Vec<PathBuf> {
        self.backup.items.iter().map(|p| expand_path(p)).collect()
    }

    fn items(&self, pairs: &[PathPair], file: bool) -> Vec<ConfigItem> {
        pairs
            .iter()
            .map(|pair| {
                let source = self.profile_path(&pair.source);
                let target = expand_path(&pair.target);
                if file {
                    ConfigItem::file(source, target)
                } else {
                    ConfigItem::directory(source, target)
                }
            })
            .collect()
    }

    pub fn system_files(&self) -> Vec<ConfigItem> {
        self.items(&self.system_files, true)
    }

    pub fn placement_files(&self) -> Vec<ConfigItem> {
        self.items(&self.placement.files, true)
    }

    pub fn placement_folders(&self) -> Vec<ConfigItem> {
        self.items(&self.placement.folders, false)
    }

    /// Placement targets that no backup item covers. Under
    /// `overwrite = "replace"` these are deleted with no copy in the snapshot.
    pub fn unprotected_targets(&self) -> Vec<PathBuf> {
        let covered = self.backup_items();
        self.placement_files()
            .into_iter()
            .chain(self.placement_folders())
            .map(|item| item.target)
            .filter(|target| !covered.iter().any(|b| target.starts_with(b)))
            .collect()
    }

    pub fn folders_to_create(&self) -> Vec<PathBuf> {
        self.placement.create.iter().map(|p| expand_path(p)).collect()
    }

    pub fn executables(&self) -> Vec<PathBuf> {
        self.placement.executables.iter().map(|p| expand_path(p)).collect()
    }

    pub fn environment_file(&self) -> PathBuf {
        expand_path(&self.environment.file)
    }
}
