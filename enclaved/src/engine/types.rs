/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::error::EngineError;

/// Engine-reported container status, as a closed enum so every status
/// mapping in the crate is an exhaustive `match` the compiler checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Removing,
    Dead,
}

impl ContainerStatus {
    /// Whether the container counts as live when deriving enclave status.
    /// Restarting counts as running: the engine is actively keeping the
    /// container alive.
    pub fn is_running(&self) -> bool {
        match self {
            ContainerStatus::Running | ContainerStatus::Restarting => true,
            ContainerStatus::Created
            | ContainerStatus::Paused
            | ContainerStatus::Exited
            | ContainerStatus::Removing
            | ContainerStatus::Dead => false,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl Display for PortProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "tcp"),
            PortProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// A port inside a container, e.g. `7443/tcp`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct ContainerPort {
    pub number: u16,
    pub protocol: PortProtocol,
}

impl ContainerPort {
    pub fn tcp(number: u16) -> Self {
        ContainerPort { number, protocol: PortProtocol::Tcp }
    }

    pub fn udp(number: u16) -> Self {
        ContainerPort { number, protocol: PortProtocol::Udp }
    }
}

impl Display for ContainerPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}

impl FromStr for ContainerPort {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || EngineError::MalformedPort { input: s.to_string() };
        let (number, protocol) = s.split_once('/').ok_or_else(malformed)?;
        let number = number.parse::<u16>().map_err(|_| malformed())?;
        let protocol = match protocol {
            "tcp" => PortProtocol::Tcp,
            "udp" => PortProtocol::Udp,
            _ => return Err(malformed()),
        };
        Ok(ContainerPort { number, protocol })
    }
}

/// Declares, per container port, whether/how it is exposed on the host.
/// The actual host binding only exists once the engine reports it; see
/// [`super::EngineAdapter::create_and_start_container`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case", tag = "publish", content = "host_port")]
pub enum PortPublishSpec {
    /// Reachable only inside the enclave network.
    NoPublish,
    /// Published to an engine-chosen ephemeral host port.
    AutoPublish,
    /// Published to a specific host port.
    ToHostPort(u16),
}

impl PortPublishSpec {
    /// Published ports must be visible in container inspection after start;
    /// unpublished ones never get a host binding.
    pub fn must_be_bound_after_start(&self) -> bool {
        match self {
            PortPublishSpec::NoPublish => false,
            PortPublishSpec::AutoPublish
            | PortPublishSpec::ToHostPort(_) => true,
        }
    }
}

/// An engine-reported binding of a container port on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: u16,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
    pub port_bindings: HashMap<ContainerPort, HostBinding>,
    /// IP per attached network, keyed by network id.
    pub network_ips: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}
