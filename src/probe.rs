//! Read-only facts about the local machine.

use crate::config::ProbeConfig;
use crate::error::{ClientError, Result};
use crate::runner::CommandRunner;
use plist::Value;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MachineIdentity {
    pub uuid: Option<String>,
    pub serial: Option<String>,
}

pub struct EnvironmentProbe<'a, R: CommandRunner> {
    runner: &'a R,
    config: &'a ProbeConfig,
}

impl<'a, R: CommandRunner> EnvironmentProbe<'a, R> {
    pub fn new(runner: &'a R, config: &'a ProbeConfig) -> Self {
        Self { runner, config }
    }

    /// The local address the OS would use to reach the configured target.
    /// Nothing is sent; connecting a UDP socket only selects a route.
    pub fn current_ip_address(&self) -> Result<IpAddr> {
        let target: SocketAddr = self.config.route_target.parse().map_err(|_| {
            ClientError::Config(format!(
                "probe.route_target '{}' is not a socket address",
                self.config.route_target
            ))
        })?;
        let bind_addr = match target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(bind_addr).map_err(ClientError::NetworkUnavailable)?;
        socket
            .connect(target)
            .map_err(ClientError::NetworkUnavailable)?;
        let local = socket.local_addr().map_err(ClientError::NetworkUnavailable)?;
        tracing::debug!(address = %local.ip(), "resolved local address");
        Ok(local.ip())
    }

    pub fn console_user(&self) -> Result<Option<String>> {
        let output = self
            .runner
            .capture(&self.config.console_user_command, &mut |_| {})?;
        Ok(parse_console_user(&output.text))
    }

    /// Queried fresh on every call.
    pub fn hardware_identity(&self) -> Result<MachineIdentity> {
        let output = self
            .runner
            .capture(&self.config.hardware_command, &mut |_| {})?;
        parse_hardware_identity(output.text.as_bytes())
    }

    pub fn udid(&self) -> Result<Option<String>> {
        Ok(self.hardware_identity()?.uuid)
    }

    pub fn serial_number(&self) -> Result<Option<String>> {
        Ok(self.hardware_identity()?.serial)
    }
}

/// Finds the first `Name : value` line of a scutil dictionary dump.
pub fn parse_console_user(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "Name" {
            return None;
        }
        let user = value.trim_start().trim_end();
        if user.is_empty() {
            None
        } else {
            Some(user.to_string())
        }
    })
}

/// Reads `platform_UUID` and `serial_number` from the first item of the
/// first record in a system_profiler XML plist.
pub fn parse_hardware_identity(bytes: &[u8]) -> Result<MachineIdentity> {
    let value = Value::from_reader_xml(bytes)?;
    let item = value
        .as_array()
        .and_then(|records| records.first())
        .and_then(Value::as_dictionary)
        .and_then(|record| record.get("_items"))
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_dictionary);
    let Some(item) = item else {
        tracing::warn!("hardware inventory has no items");
        return Ok(MachineIdentity::default());
    };
    let field = |key: &str| item.get(key).and_then(Value::as_string).map(str::to_string);
    Ok(MachineIdentity {
        uuid: field("platform_UUID"),
        serial: field("serial_number"),
    })
}
