//! Subprocess plumbing.
//!
//! Every external tool (pacman, paru, git, makepkg, systemctl, sudo) is reached
//! through [`CommandRunner`]. Working directories travel with the command, so
//! nothing in the workflow ever calls `set_current_dir`.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// A single external command, described but not yet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
    /// Capture stdout/stderr instead of streaming them to the terminal.
    pub quiet: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            quiet: false,
        }
    }

    /// Builds a command from an argv-style list such as `["pacman", "-Q"]`.
    pub fn from_argv(argv: &[String]) -> Self {
        let mut parts = argv.iter();
        let program = parts.next().cloned().unwrap_or_default();
        Self::new(program).args(parts)
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Wraps the command in a privilege helper (`sudo`, `doas -n`, ...).
    /// An empty helper leaves the command untouched, which is what you want
    /// when already running as root.
    pub fn elevated(mut self, privilege: &str) -> Self {
        let mut helper = privilege.split_whitespace();
        let Some(wrapper) = helper.next() else {
            return self;
        };
        let mut args: Vec<String> = helper.map(str::to_string).collect();
        args.push(std::mem::replace(&mut self.program, wrapper.to_string()));
        args.append(&mut self.args);
        self.args = args;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({})", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

pub trait CommandRunner {
    /// Runs the command to completion. `Err` only means it could not be run
    /// at all; a nonzero exit is reported through [`CommandOutput::code`].
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ExecError>;

    /// Like [`run`](Self::run) but treats a nonzero exit as an error.
    fn run_checked(&self, cmd: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let output = self.run(cmd)?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::Failed {
                command: cmd.to_string(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    /// Uses the exit status as a yes/no answer. A command that cannot be
    /// spawned answers "no".
    fn probe(&self, cmd: &CommandSpec) -> bool {
        match self.run(cmd) {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("{e}");
                false
            }
        }
    }
}

/// Runs commands for real through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ExecError> {
        debug!(cwd = ?cmd.cwd, "running `{cmd}`");
        let spawn_error = |source: std::io::Error| ExecError::Spawn {
            command: cmd.to_string(),
            source,
        };

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        if cmd.quiet {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        if cmd.stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn().map_err(spawn_error)?;
        if let (Some(input), Some(mut pipe)) = (&cmd.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).map_err(spawn_error)?;
            // pipe drops here so the child sees EOF
        }
        let output = child.wait_with_output().map_err(spawn_error)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
