/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! The stable label scheme stamped onto every engine object created for an
//! enclave. Labels are the *only* mechanism for rediscovering an enclave's
//! resources after a process restart (there is no durable index), so label
//! completeness implies discoverability. Key strings must never change
//! across versions or old resources become invisible.

use std::collections::HashMap;

use super::error::{EngineError, Result};
use super::types::{ContainerPort, PortPublishSpec};

pub const APP_ID_LABEL_KEY: &str = "io.enclaved.app-id";
pub const APP_ID_LABEL_VALUE: &str = "enclaved";

pub const ENCLAVE_UUID_LABEL_KEY: &str = "io.enclaved.enclave-uuid";
pub const RESOURCE_TYPE_LABEL_KEY: &str = "io.enclaved.resource-type";
pub const ENCLAVE_MODE_LABEL_KEY: &str = "io.enclaved.mode";

/// Private address of the control container inside its enclave network,
/// stamped at launch so rediscovery doesn't depend on a live inspect.
pub const PRIVATE_IP_LABEL_KEY: &str = "io.enclaved.private-ip";
pub const PRIVATE_PORT_LABEL_KEY: &str = "io.enclaved.private-port";

/// Opaque serialization of a container's port publish specs. Produced and
/// consumed only by the adapter.
pub const PORT_SPECS_LABEL_KEY: &str = "io.enclaved.port-specs";

pub const ENCLAVE_MODE_TEST_LABEL_VALUE: &str = "test";
pub const ENCLAVE_MODE_PRODUCTION_LABEL_VALUE: &str = "production";

/// Engine-visible name prefix for enclave networks; the enclave name is the
/// network name with this prefix stripped.
pub const ENCLAVE_NETWORK_NAME_PREFIX: &str = "en-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    EnclaveNetwork,
    ControlContainer,
    LogsCollector,
    EnclaveDataVolume,
}

impl ResourceType {
    pub fn label_value(&self) -> &'static str {
        match self {
            ResourceType::EnclaveNetwork => "enclave-network",
            ResourceType::ControlContainer => "control-container",
            ResourceType::LogsCollector => "logs-collector",
            ResourceType::EnclaveDataVolume => "enclave-data-volume",
        }
    }
}

/// The common label set `{app-id, resource-type, enclave-uuid}` every engine
/// object created for an enclave must carry.
pub fn enclave_resource_labels(
    enclave_uuid: &str,
    resource_type: ResourceType,
) -> HashMap<String, String> {
    HashMap::from([
        (APP_ID_LABEL_KEY.to_string(), APP_ID_LABEL_VALUE.to_string()),
        (ENCLAVE_UUID_LABEL_KEY.to_string(), enclave_uuid.to_string()),
        (
            RESOURCE_TYPE_LABEL_KEY.to_string(),
            resource_type.label_value().to_string(),
        ),
    ])
}

/// Filter matching every object of the app, regardless of enclave.
pub fn app_labels() -> HashMap<String, String> {
    HashMap::from([(
        APP_ID_LABEL_KEY.to_string(),
        APP_ID_LABEL_VALUE.to_string(),
    )])
}

/// Filter matching every object of one enclave.
pub fn enclave_labels(enclave_uuid: &str) -> HashMap<String, String> {
    HashMap::from([
        (APP_ID_LABEL_KEY.to_string(), APP_ID_LABEL_VALUE.to_string()),
        (ENCLAVE_UUID_LABEL_KEY.to_string(), enclave_uuid.to_string()),
    ])
}

pub fn serialize_port_specs(
    ports: &HashMap<ContainerPort, PortPublishSpec>,
) -> Result<String> {
    let by_port_str: HashMap<String, &PortPublishSpec> =
        ports.iter().map(|(port, spec)| (port.to_string(), spec)).collect();
    serde_json::to_string(&by_port_str).map_err(|e| {
        EngineError::backend("serialize-port-specs", "port-specs-label", e)
    })
}

pub fn deserialize_port_specs(
    serialized: &str,
) -> Result<HashMap<ContainerPort, PortPublishSpec>> {
    let by_port_str: HashMap<String, PortPublishSpec> =
        serde_json::from_str(serialized).map_err(|e| {
            EngineError::backend(
                "deserialize-port-specs",
                "port-specs-label",
                e,
            )
        })?;
    by_port_str
        .into_iter()
        .map(|(port, spec)| Ok((port.parse::<ContainerPort>()?, spec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn port_specs_survive_the_label_round_trip() {
        let ports = HashMap::from([
            (ContainerPort::tcp(7443), PortPublishSpec::AutoPublish),
            (ContainerPort::udp(53), PortPublishSpec::NoPublish),
            (ContainerPort::tcp(9000), PortPublishSpec::ToHostPort(19000)),
        ]);

        let serialized = serialize_port_specs(&ports).expect("serialize");
        let deserialized =
            deserialize_port_specs(&serialized).expect("deserialize");
        assert_eq!(deserialized, ports);
    }

    #[test]
    fn resource_labels_carry_the_full_discovery_set() {
        let labels = enclave_resource_labels(
            "0123456789abcdef",
            ResourceType::ControlContainer,
        );
        assert_eq!(labels[APP_ID_LABEL_KEY], APP_ID_LABEL_VALUE);
        assert_eq!(labels[ENCLAVE_UUID_LABEL_KEY], "0123456789abcdef");
        assert_eq!(labels[RESOURCE_TYPE_LABEL_KEY], "control-container");
    }
}
