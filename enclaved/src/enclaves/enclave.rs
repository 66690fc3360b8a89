/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::engine::labels;
use crate::engine::ContainerPort;

use super::enclave_name::EnclaveName;

/// Display form of a UUID: enough hex to be unique in practice, short enough
/// to type.
pub const SHORTENED_UUID_LENGTH: usize = 12;

/// Immutable enclave identity, generated once at creation and never reused.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct EnclaveUuid(String);

impl EnclaveUuid {
    pub fn generate() -> Self {
        EnclaveUuid(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shortened(&self) -> &str {
        &self.0[..SHORTENED_UUID_LENGTH.min(self.0.len())]
    }
}

impl From<String> for EnclaveUuid {
    fn from(uuid: String) -> Self {
        EnclaveUuid(uuid)
    }
}

impl Display for EnclaveUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclaveStatus {
    /// The network exists but no containers do.
    Empty,
    /// Containers exist, none is running.
    Stopped,
    /// At least one container is running.
    Running,
}

impl Display for EnclaveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EnclaveStatus::Empty => write!(f, "empty"),
            EnclaveStatus::Stopped => write!(f, "stopped"),
            EnclaveStatus::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclaveMode {
    Test,
    Production,
}

impl EnclaveMode {
    pub fn label_value(&self) -> &'static str {
        match self {
            EnclaveMode::Test => labels::ENCLAVE_MODE_TEST_LABEL_VALUE,
            EnclaveMode::Production => {
                labels::ENCLAVE_MODE_PRODUCTION_LABEL_VALUE
            }
        }
    }

    /// Unknown label values read back as test mode, the conservative side
    /// (test enclaves are the cleanable ones).
    pub fn from_label_value(value: &str) -> Self {
        if value == labels::ENCLAVE_MODE_PRODUCTION_LABEL_VALUE {
            EnclaveMode::Production
        } else {
            EnclaveMode::Test
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, EnclaveMode::Production)
    }
}

/// Addresses of the control container as the launcher reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlContainerInfo {
    pub container_id: String,
    pub private_ip: String,
    pub private_port: ContainerPort,
    /// Present only once the engine published the control port.
    pub public_ip: Option<String>,
    pub public_port: Option<u16>,
    /// Bridge-network address, reachable from the host before publishing.
    pub bridge_ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Enclave {
    pub uuid: EnclaveUuid,
    pub name: EnclaveName,
    pub status: EnclaveStatus,
    pub mode: EnclaveMode,
    /// Engine-reported creation timestamp of the enclave network.
    pub creation_time: Option<DateTime<Utc>>,
    pub control_container: Option<ControlContainerInfo>,
}

impl Enclave {
    pub fn shortened_uuid(&self) -> &str {
        self.uuid.shortened()
    }
}
