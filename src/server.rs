//! Management server location, read from the agent's local preferences.

use crate::error::Result;
use plist::{Dictionary, Value};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const SERVER_URL_KEY: &str = "jss_url";

/// The agent's preference dictionary; empty when the file is absent.
#[derive(Debug, Clone, Default)]
pub struct ManagementPreferences {
    entries: Dictionary,
}

impl ManagementPreferences {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no preferences file");
            return Ok(Self::default());
        }
        let value = Value::from_file(path)?;
        Ok(Self {
            entries: value.into_dictionary().unwrap_or_default(),
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_string)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerUrl {
    pub url: String,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(https?)://([^/:]+)(?::(\d+))?(?:/|$)").expect("static url pattern")
    })
}

impl ServerUrl {
    /// Splits a server URL into scheme, host and port. A URL without an
    /// explicit port gets its scheme's default.
    pub fn parse(url: &str) -> Self {
        let Some(caps) = url_pattern().captures(url) else {
            tracing::warn!(url, "server url does not match http(s)://host[:port]/");
            return Self {
                url: url.to_string(),
                protocol: None,
                host: None,
                port: None,
            };
        };
        let protocol = caps[1].to_string();
        let port = match caps.get(3) {
            Some(m) => m.as_str().parse().ok(),
            None if protocol == "https" => Some(443),
            None => Some(80),
        };
        Self {
            url: url.to_string(),
            host: Some(caps[2].to_string()),
            protocol: Some(protocol),
            port,
        }
    }
}

/// Per-instance cache of the server location. Nothing is shared between
/// resolvers; call `refresh` to re-read or `invalidate` to drop the cache.
#[derive(Debug)]
pub struct ServerResolver {
    preferences_path: PathBuf,
    cached: Option<Option<ServerUrl>>,
}

impl ServerResolver {
    pub fn new(preferences_path: impl Into<PathBuf>) -> Self {
        Self {
            preferences_path: preferences_path.into(),
            cached: None,
        }
    }

    pub fn refresh(&mut self) -> Result<Option<&ServerUrl>> {
        let prefs = ManagementPreferences::load(&self.preferences_path)?;
        let resolved = prefs.get_str(SERVER_URL_KEY).map(ServerUrl::parse);
        Ok(self.cached.insert(resolved).as_ref())
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    fn resolved(&mut self) -> Result<Option<&ServerUrl>> {
        if self.cached.is_none() {
            return self.refresh();
        }
        Ok(self.cached.as_ref().and_then(Option::as_ref))
    }

    pub fn management_server_url(&mut self) -> Result<Option<String>> {
        Ok(self.resolved()?.map(|s| s.url.clone()))
    }

    pub fn host(&mut self) -> Result<Option<String>> {
        Ok(self.resolved()?.and_then(|s| s.host.clone()))
    }

    pub fn protocol(&mut self) -> Result<Option<String>> {
        Ok(self.resolved()?.and_then(|s| s.protocol.clone()))
    }

    pub fn port(&mut self) -> Result<Option<u16>> {
        Ok(self.resolved()?.and_then(|s| s.port))
    }

    pub fn server(&mut self) -> Result<Option<ServerUrl>> {
        Ok(self.resolved()?.cloned())
    }

    /// Whether this machine is enrolled under `host`.
    pub fn is_managed_by(&mut self, host: &str) -> Result<bool> {
        Ok(self
            .host()?
            .is_some_and(|current| current.eq_ignore_ascii_case(host)))
    }
}
