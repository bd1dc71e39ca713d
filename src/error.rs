use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("the management agent binary is not installed on this computer")]
    AgentNotInstalled,
    #[error("the dialog helper is not installed properly on this computer")]
    HelperNotInstalled,
    #[error("you must have root privileges to run agent command '{command}'")]
    InsufficientPrivilege { command: String },
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("invalid window type '{0}'; expected one of hud, csa, utility, util, fs, full_screen, fullscreen")]
    InvalidWindowType(String),
    #[error("invalid value for {option}: {message}")]
    InvalidOptionValue { option: String, message: String },
    #[error("receipts folder {} does not exist", .0.display())]
    NoReceiptsFolder(PathBuf),
    #[error("network unavailable: {0}")]
    NetworkUnavailable(io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub(crate) fn invalid_option(option: &str, message: impl Into<String>) -> Self {
        ClientError::InvalidOptionValue {
            option: option.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in `--json` error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::AgentNotInstalled => "agent_not_installed",
            ClientError::HelperNotInstalled => "helper_not_installed",
            ClientError::InsufficientPrivilege { .. } => "insufficient_privilege",
            ClientError::InvalidArguments(_) => "invalid_arguments",
            ClientError::InvalidWindowType(_) => "invalid_window_type",
            ClientError::InvalidOptionValue { .. } => "invalid_option_value",
            ClientError::NoReceiptsFolder(_) => "no_receipts_folder",
            ClientError::NetworkUnavailable(_) => "network_unavailable",
            ClientError::Config(_) => "config_error",
            ClientError::Io(_) => "io_error",
            ClientError::Yaml(_) => "yaml_error",
            ClientError::Json(_) => "json_error",
            ClientError::Plist(_) => "plist_error",
        }
    }
}
