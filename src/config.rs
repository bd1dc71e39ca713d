use crate::error::{ClientError, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "JSS_CLIENT_CONFIG";
pub const CONFIG_DIR_ENV: &str = "JSS_CLIENT_CONFIG_DIR";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub paths: Paths,
    pub probe: ProbeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    /// Agent install locations in priority order; the first executable one wins.
    pub agent_binaries: Vec<PathBuf>,
    pub helper_binary: PathBuf,
    pub receipts_dir: PathBuf,
    pub preferences_plist: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub route_target: String,
    pub console_user_command: String,
    pub hardware_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            paths: Paths::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            agent_binaries: vec![
                PathBuf::from("/usr/local/jamf/bin/jamf"),
                PathBuf::from("/usr/sbin/jamf"),
            ],
            helper_binary: PathBuf::from(
                "/Library/Application Support/JAMF/bin/jamfHelper.app/Contents/MacOS/jamfHelper",
            ),
            receipts_dir: PathBuf::from("/Library/Application Support/JAMF/Receipts"),
            preferences_plist: PathBuf::from("/Library/Preferences/com.jamfsoftware.jamf.plist"),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            route_target: "192.168.0.0:1".to_string(),
            console_user_command: "echo \"show State:/Users/ConsoleUser\" | /usr/sbin/scutil"
                .to_string(),
            hardware_command: "/usr/sbin/system_profiler SPHardwareDataType -xml".to_string(),
        }
    }
}

pub fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let mut base = default_config_dir();
    base.push("config.yaml");
    base
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(path);
    }
    let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("jss-client");
    base
}

pub fn read_config_from_str(content: &str) -> Result<Config> {
    let cfg: Config = serde_yaml::from_str(content)?;
    if cfg.version != 1 {
        return Err(ClientError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Reads the config at `path`; a missing file means built-in defaults.
pub fn read_config(path: &Path) -> Result<Config> {
    match fs::read_to_string(path) {
        Ok(content) => read_config_from_str(&content),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.paths.agent_binaries.is_empty() {
        return Err(ClientError::Config(
            "paths.agent_binaries must contain at least one path".to_string(),
        ));
    }
    if cfg
        .paths
        .agent_binaries
        .iter()
        .any(|p| p.as_os_str().is_empty())
    {
        return Err(ClientError::Config(
            "paths.agent_binaries must not contain empty paths".to_string(),
        ));
    }
    for (field, path) in [
        ("paths.helper_binary", &cfg.paths.helper_binary),
        ("paths.receipts_dir", &cfg.paths.receipts_dir),
        ("paths.preferences_plist", &cfg.paths.preferences_plist),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ClientError::Config(format!("{field} must be non-empty")));
        }
    }
    if cfg.probe.route_target.parse::<SocketAddr>().is_err() {
        return Err(ClientError::Config(format!(
            "probe.route_target '{}' is not a socket address",
            cfg.probe.route_target
        )));
    }
    if cfg.probe.console_user_command.trim().is_empty()
        || cfg.probe.hardware_command.trim().is_empty()
    {
        return Err(ClientError::Config(
            "probe commands must be non-empty".to_string(),
        ));
    }
    Ok(())
}
