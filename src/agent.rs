//! Front end for the privileged management agent binary.

use crate::config::Paths;
use crate::error::{ClientError, Result};
use crate::privilege::PrivilegeChecker;
use crate::runner::{shell_escape, CommandOutput, CommandRunner, ExecutionResult};
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Agent sub-commands that work without root.
pub const ROOTLESS_COMMANDS: &[&str] = &[
    "about",
    "checkJSSConnection",
    "getARDFields",
    "getComputerName",
    "help",
    "listUsers",
    "version",
];

const VERBOSE_FLAG: &str = "-verbose";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand(String);

impl AgentCommand {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self(name.trim_start_matches(':').to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_rootless(&self) -> bool {
        ROOTLESS_COMMANDS.contains(&self.0.as_str())
    }
}

/// Extra arguments: nothing, a caller-joined line used verbatim, or a list
/// of tokens that are escaped one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AgentArgs {
    #[default]
    None,
    Line(String),
    List(Vec<String>),
}

impl TryFrom<Value> for AgentArgs {
    type Error = ClientError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(AgentArgs::None),
            Value::String(line) => Ok(AgentArgs::Line(line)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(token) => Ok(token),
                    other => Err(ClientError::InvalidArguments(format!(
                        "args must be a string or an array of strings, found element {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(AgentArgs::List),
            other => Err(ClientError::InvalidArguments(format!(
                "args must be a string or an array of strings, found {other}"
            ))),
        }
    }
}

pub(crate) fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub struct Agent<'a, R: CommandRunner, P: PrivilegeChecker> {
    runner: &'a R,
    privilege: &'a P,
    paths: &'a Paths,
}

impl<'a, R: CommandRunner, P: PrivilegeChecker> Agent<'a, R, P> {
    pub fn new(runner: &'a R, privilege: &'a P, paths: &'a Paths) -> Self {
        Self {
            runner,
            privilege,
            paths,
        }
    }

    /// First executable install location, in configured priority order.
    pub fn binary_path(&self) -> Option<&Path> {
        self.paths
            .agent_binaries
            .iter()
            .map(PathBuf::as_path)
            .find(|path| is_executable(path))
    }

    pub fn is_installed(&self) -> bool {
        self.binary_path().is_some()
    }

    pub fn build_command(
        &self,
        command: &AgentCommand,
        args: &AgentArgs,
        verbose: bool,
    ) -> Result<String> {
        let binary = self.binary_path().ok_or(ClientError::AgentNotInstalled)?;
        if !command.is_rootless() && !self.privilege.is_elevated() {
            return Err(ClientError::InsufficientPrivilege {
                command: command.name().to_string(),
            });
        }

        let mut line = format!(
            "{} {}",
            shell_escape(&binary.to_string_lossy()),
            shell_escape(command.name())
        );
        match args {
            AgentArgs::None => {}
            AgentArgs::Line(extra) => {
                if !extra.trim().is_empty() {
                    line.push(' ');
                    line.push_str(extra);
                }
            }
            AgentArgs::List(tokens) => {
                for token in tokens {
                    line.push(' ');
                    line.push_str(&shell_escape(token));
                }
            }
        }
        if verbose && !line.split_whitespace().any(|token| token == VERBOSE_FLAG) {
            line.push(' ');
            line.push_str(VERBOSE_FLAG);
        }
        tracing::debug!(command = %line, "built agent command");
        Ok(line)
    }

    /// Runs an agent command through the captured strategy. A non-zero exit
    /// status is returned as data.
    pub fn run(
        &self,
        command: &AgentCommand,
        args: &AgentArgs,
        verbose: bool,
    ) -> Result<ExecutionResult> {
        self.capture(command, args, verbose).map(ExecutionResult::Captured)
    }

    fn capture(
        &self,
        command: &AgentCommand,
        args: &AgentArgs,
        verbose: bool,
    ) -> Result<CommandOutput> {
        let line = self.build_command(command, args, verbose)?;
        if verbose {
            println!("Running: {line}");
        }
        let output = self.runner.capture(&line, &mut |text| {
            if verbose {
                println!("{text}");
            }
        })?;
        tracing::debug!(status = output.status_code, "agent command finished");
        Ok(output)
    }

    /// Whether the agent can reach its management server.
    pub fn server_available(&self) -> Result<bool> {
        let output = self.capture(
            &AgentCommand::new("checkJSSConnection"),
            &AgentArgs::Line("-retry 1".to_string()),
            false,
        )?;
        Ok(output.success())
    }

    /// Parses `version=X` from the agent's version command.
    pub fn version(&self) -> Result<Option<String>> {
        let output = self.capture(&AgentCommand::new("version"), &AgentArgs::None, false)?;
        Ok(output
            .text
            .lines()
            .find_map(|line| line.trim().strip_prefix("version="))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    /// Entries of the agent's receipts folder, sorted by path.
    pub fn receipts(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.paths.receipts_dir;
        if !dir.is_dir() {
            return Err(ClientError::NoReceiptsFolder(dir.clone()));
        }
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}
