//! Argument compiler and launcher for the dialog helper.
//!
//! Each display option is described by an entry in [`OPTION_REGISTRY`]: the
//! flag it emits and the kind of value it accepts. Compilation walks the
//! caller's options in order and asks the matching entry for its tokens.

use crate::agent::is_executable;
use crate::error::{ClientError, Result};
use crate::runner::{shell_escape, CommandRunner, ExecutionResult};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const STARTUP_FLAG: &str = "-startlaunchd";
pub const WINDOW_TYPE_FLAG: &str = "-windowType";
pub const WINDOW_POSITIONS: &[&str] = &["ul", "ll", "ur", "lr"];
pub const ALIGNMENTS: &[&str] = &["right", "left", "center", "justified", "natural"];
pub const BUTTONS: &[u64] = &[1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hud,
    Utility,
    FullScreen,
}

impl WindowType {
    pub fn token(self) -> &'static str {
        match self {
            WindowType::Hud => "hud",
            WindowType::Utility => "utility",
            WindowType::FullScreen => "fs",
        }
    }
}

impl FromStr for WindowType {
    type Err = ClientError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().trim_start_matches(':') {
            "hud" | "csa" => Ok(WindowType::Hud),
            "utility" | "util" => Ok(WindowType::Utility),
            "fs" | "full_screen" | "fullscreen" => Ok(WindowType::FullScreen),
            _ => Err(ClientError::InvalidWindowType(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    FreeText,
    Enumerated(&'static [&'static str]),
    /// Emits only the flag, and only for a truthy value.
    Presence,
    Button,
    Integer,
    /// Comma-joined list of delay seconds.
    DelayChoices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub flag: &'static str,
    pub kind: OptionKind,
}

const fn opt(name: &'static str, flag: &'static str, kind: OptionKind) -> OptionSpec {
    OptionSpec { name, flag, kind }
}

pub const OPTION_REGISTRY: &[OptionSpec] = &[
    opt("window_position", "-windowPosition", OptionKind::Enumerated(WINDOW_POSITIONS)),
    opt("title", "-title", OptionKind::FreeText),
    opt("heading", "-heading", OptionKind::FreeText),
    opt("align_heading", "-alignHeading", OptionKind::Enumerated(ALIGNMENTS)),
    opt("description", "-description", OptionKind::FreeText),
    opt("align_description", "-alignDescription", OptionKind::Enumerated(ALIGNMENTS)),
    opt("icon", "-icon", OptionKind::FreeText),
    opt("icon_size", "-iconSize", OptionKind::Integer),
    opt("full_screen_icon", "-fullScreenIcon", OptionKind::Presence),
    opt("button1", "-button1", OptionKind::FreeText),
    opt("button2", "-button2", OptionKind::FreeText),
    opt("default_button", "-defaultButton", OptionKind::Button),
    opt("cancel_button", "-cancelButton", OptionKind::Button),
    opt("timeout", "-timeout", OptionKind::Integer),
    opt("show_delay_options", "-showDelayOptions", OptionKind::DelayChoices),
    opt("countdown", "-countdown", OptionKind::Presence),
    opt("align_countdown", "-alignCountdown", OptionKind::Enumerated(ALIGNMENTS)),
    opt("lock_hud", "-lockHUD", OptionKind::Presence),
];

pub fn lookup_option(name: &str) -> Option<&'static OptionSpec> {
    let name = name.trim_start_matches(':');
    OPTION_REGISTRY.iter().find(|spec| spec.name == name)
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn unsigned(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl OptionSpec {
    /// Tokens this option adds to the argument vector for `value`.
    pub fn compile(&self, value: &Value) -> Result<Vec<String>> {
        let flag = self.flag.to_string();
        match self.kind {
            OptionKind::FreeText => {
                let text = scalar_text(value).ok_or_else(|| {
                    ClientError::invalid_option(self.name, format!("expected text, found {value}"))
                })?;
                Ok(vec![flag, text])
            }
            OptionKind::Enumerated(allowed) => {
                let text = scalar_text(value).unwrap_or_default();
                let token = text.trim_start_matches(':');
                if !allowed.contains(&token) {
                    return Err(ClientError::invalid_option(
                        self.name,
                        format!("must be one of {}, found {value}", allowed.join(", ")),
                    ));
                }
                Ok(vec![flag, token.to_string()])
            }
            OptionKind::Presence => Ok(if is_truthy(value) { vec![flag] } else { Vec::new() }),
            OptionKind::Button => match unsigned(value) {
                Some(id) if BUTTONS.contains(&id) => Ok(vec![flag, id.to_string()]),
                _ => Err(ClientError::invalid_option(
                    self.name,
                    format!("must be 1 or 2, found {value}"),
                )),
            },
            OptionKind::Integer => {
                let number = unsigned(value).ok_or_else(|| {
                    ClientError::invalid_option(
                        self.name,
                        format!("expected a non-negative integer, found {value}"),
                    )
                })?;
                Ok(vec![flag, number.to_string()])
            }
            OptionKind::DelayChoices => Ok(vec![flag, delay_choices(self.name, value)?]),
        }
    }
}

fn delay_choices(name: &str, value: &Value) -> Result<String> {
    let invalid = || {
        ClientError::invalid_option(
            name,
            format!("expected a list of delay seconds, found {value}"),
        )
    };
    let seconds: Vec<u64> = match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse().map_err(|_| invalid()))
            .collect::<Result<_>>()?,
        Value::Array(items) => items
            .iter()
            .map(|item| unsigned(item).ok_or_else(invalid))
            .collect::<Result<_>>()?,
        Value::Number(_) => vec![unsigned(value).ok_or_else(invalid)?],
        _ => return Err(invalid()),
    };
    if seconds.is_empty() {
        return Err(invalid());
    }
    Ok(seconds
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", "))
}

/// Named display options in caller order. Setting a name twice keeps its
/// first position and the latest value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogOptions {
    entries: Vec<(String, Value)>,
}

impl DialogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds options from a JSON object, keeping its key order.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => Err(ClientError::InvalidArguments(format!(
                "dialog options must be a JSON object, found {other}"
            ))),
        }
    }
}

/// What to do with option names missing from the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownOptionPolicy {
    #[default]
    Ignore,
    Reject,
}

/// Compiles the window type and options into the helper's flag vector. The
/// window type is checked before any option is looked at.
pub fn compile_helper_args(
    window_type: &str,
    options: &DialogOptions,
    policy: UnknownOptionPolicy,
) -> Result<Vec<String>> {
    let window_type: WindowType = window_type.parse()?;
    let mut args = vec![
        STARTUP_FLAG.to_string(),
        WINDOW_TYPE_FLAG.to_string(),
        window_type.token().to_string(),
    ];
    for (name, value) in options.iter() {
        match lookup_option(name) {
            Some(spec) => args.extend(spec.compile(value)?),
            None if policy == UnknownOptionPolicy::Reject => {
                return Err(ClientError::invalid_option(name, "unknown dialog option"));
            }
            None => tracing::debug!(option = name, "ignoring unknown dialog option"),
        }
    }
    Ok(args)
}

#[derive(Debug, Clone, Default)]
pub struct HelperRequest {
    pub window_type: String,
    pub options: DialogOptions,
    /// Appended verbatim; escaping it is the caller's job.
    pub arg_string: Option<String>,
    pub output_file: Option<PathBuf>,
    pub abandon_process: bool,
    pub unknown_options: UnknownOptionPolicy,
}

impl HelperRequest {
    pub fn new(window_type: impl Into<String>) -> Self {
        Self {
            window_type: window_type.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub arg_string: Option<String>,
    pub output_file: Option<PathBuf>,
}

impl HelperInvocation {
    fn passthrough_string(&self) -> Option<&str> {
        self.arg_string.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Compiled flags, then the raw passthrough string, then redirection.
    pub fn argument_vector(&self) -> Vec<String> {
        let mut out = self.args.clone();
        if let Some(raw) = self.passthrough_string() {
            out.push(raw.to_string());
        }
        if let Some(path) = &self.output_file {
            out.push(">".to_string());
            out.push(path.to_string_lossy().to_string());
        }
        out
    }

    pub fn command_line(&self) -> String {
        let mut line = shell_escape(&self.program.to_string_lossy());
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_escape(arg));
        }
        if let Some(raw) = self.passthrough_string() {
            line.push(' ');
            line.push_str(raw);
        }
        if let Some(path) = &self.output_file {
            line.push_str(" > ");
            line.push_str(&shell_escape(&path.to_string_lossy()));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HelperExit {
    Button1,
    Button2,
    LaunchFailed,
    StartedDetached,
    DelayedButton { button: u8, delay_secs: u32 },
    ExplicitExit,
    UnsupportedOs,
    TimedOut,
    BadWindowType,
    CancelDelayConflict,
    MissingWindowType,
    Other { code: i64 },
}

impl HelperExit {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => HelperExit::Button1,
            1 => HelperExit::LaunchFailed,
            2 => HelperExit::Button2,
            3 => HelperExit::StartedDetached,
            239 => HelperExit::ExplicitExit,
            240 => HelperExit::UnsupportedOs,
            243 => HelperExit::TimedOut,
            250 => HelperExit::BadWindowType,
            254 => HelperExit::CancelDelayConflict,
            255 => HelperExit::MissingWindowType,
            c if c >= 10 && matches!(c % 10, 1 | 2) => match u32::try_from(c / 10) {
                Ok(delay_secs) => HelperExit::DelayedButton {
                    button: (c % 10) as u8,
                    delay_secs,
                },
                Err(_) => HelperExit::Other { code },
            },
            _ => HelperExit::Other { code },
        }
    }

    /// Decodes the code a detached helper leaves in its output file.
    pub fn from_output(text: &str) -> Option<Self> {
        text.trim().parse().ok().map(Self::from_code)
    }
}

/// Reads a detached helper's output file; `None` until it has written a code.
pub fn read_helper_result(path: &Path) -> Result<Option<HelperExit>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(HelperExit::from_output(&text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub struct DialogHelper<'a, R: CommandRunner> {
    runner: &'a R,
    program: &'a Path,
}

impl<'a, R: CommandRunner> DialogHelper<'a, R> {
    pub fn new(runner: &'a R, program: &'a Path) -> Self {
        Self { runner, program }
    }

    pub fn is_installed(&self) -> bool {
        is_executable(self.program)
    }

    pub fn build(&self, request: &HelperRequest) -> Result<HelperInvocation> {
        if !self.is_installed() {
            return Err(ClientError::HelperNotInstalled);
        }
        let args = compile_helper_args(
            &request.window_type,
            &request.options,
            request.unknown_options,
        )?;
        Ok(HelperInvocation {
            program: self.program.to_path_buf(),
            args,
            arg_string: request.arg_string.clone(),
            output_file: request.output_file.clone(),
        })
    }

    /// Shows the dialog. Abandoned requests return the detached pid at once;
    /// others block and return the helper's exit status.
    pub fn run(&self, request: &HelperRequest) -> Result<ExecutionResult> {
        let line = self.build(request)?.command_line();
        tracing::debug!(command = %line, detached = request.abandon_process, "launching dialog helper");
        if request.abandon_process {
            Ok(ExecutionResult::Detached(self.runner.spawn_detached(&line)?))
        } else {
            Ok(ExecutionResult::Status(self.runner.passthrough(&line)?))
        }
    }
}
