/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! The safety layer between enclave logic and the raw engine client.
//!
//! Everything here compensates for the engine not being transactional:
//! create-then-start is followed by a best-effort kill when any later step
//! fails, published ports are polled until the engine reports their host
//! bindings, and bulk teardown aggregates per-object failures instead of
//! failing fast.

use anyhow::anyhow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::{ContainerSpec, EngineCapabilities, EngineClient};
use super::error::{EngineError, Result};
use super::labels::{self, ResourceType};
use super::types::{Container, ContainerPort, HostBinding, Network, Volume};
use crate::tasks::TaskRunner;

/// The engine publishes a port before the host-side binding is observable.
/// One initial check plus this many retries, spaced half a second apart.
const MAX_HOST_PORT_BINDING_CHECKS: u32 = 4;
const TIME_BETWEEN_HOST_PORT_BINDING_CHECKS: Duration =
    Duration::from_millis(500);

/// What [`EngineAdapter::create_and_start_container`] hands back on success:
/// the engine-assigned id plus the host bindings observed for every port that
/// asked to be published.
#[derive(Debug)]
pub struct CreateAndStartOutcome {
    pub container_id: String,
    pub port_bindings: HashMap<ContainerPort, HostBinding>,
}

#[derive(Clone)]
pub struct EngineAdapter {
    client: Arc<dyn EngineClient>,
    task_runner: TaskRunner,
}

impl EngineAdapter {
    pub fn new(client: Arc<dyn EngineClient>, task_runner: TaskRunner) -> Self {
        EngineAdapter { client, task_runner }
    }

    pub fn client(&self) -> &Arc<dyn EngineClient> {
        &self.client
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.client.capabilities()
    }

    /// Creates and starts a container, then waits until the engine reports a
    /// host binding for every port that must be published.
    ///
    /// If anything fails after creation, the container is killed before the
    /// error is returned, so a failed call never leaks a running container.
    pub async fn create_and_start_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<CreateAndStartOutcome> {
        let mut spec = spec.clone();
        spec.image = normalize_image_tag(&spec.image);

        // Port specs go into a label so rediscovery after a restart can
        // reconstruct them without any in-process state.
        if !spec.ports.is_empty() {
            let serialized = labels::serialize_port_specs(&spec.ports)?;
            let _ = spec
                .labels
                .insert(labels::PORT_SPECS_LABEL_KEY.to_string(), serialized);
        }

        if !self.client.image_exists(&spec.image).await? {
            info!("image '{}' not present locally, pulling", spec.image);
            self.client.pull_image(&spec.image).await?;
        }

        // The engine would also reject an unknown network, but with an error
        // that doesn't name the caller's mistake.
        if let Some(network_id) = &spec.network_id {
            if !self.client.network_exists(network_id).await? {
                return Err(EngineError::NetworkNeverCreated {
                    container: spec.name.clone(),
                    network: network_id.clone(),
                });
            }
        }

        let container_id = self.client.create_container(&spec).await?;

        if let Err(err) = self.client.start_container(&container_id).await {
            self.destroy_failed_container(&container_id, &spec.name).await;
            return Err(err);
        }

        let expected_ports: HashSet<ContainerPort> = spec
            .ports
            .iter()
            .filter(|(_, publish)| publish.must_be_bound_after_start())
            .map(|(port, _)| *port)
            .collect();

        match self
            .wait_for_port_bindings(&container_id, &spec.name, &expected_ports)
            .await
        {
            Ok(port_bindings) => {
                debug!(
                    "container '{}' ({container_id}) started with {} host bindings",
                    spec.name,
                    port_bindings.len()
                );
                Ok(CreateAndStartOutcome { container_id, port_bindings })
            }
            Err(err) => {
                self.destroy_failed_container(&container_id, &spec.name).await;
                Err(err)
            }
        }
    }

    async fn wait_for_port_bindings(
        &self,
        container_id: &str,
        container_name: &str,
        expected_ports: &HashSet<ContainerPort>,
    ) -> Result<HashMap<ContainerPort, HostBinding>> {
        if expected_ports.is_empty() {
            return Ok(HashMap::new());
        }

        let mut bound = HashMap::new();
        for attempt in 0..=MAX_HOST_PORT_BINDING_CHECKS {
            let container = self.client.inspect_container(container_id).await?;
            bound = container
                .port_bindings
                .into_iter()
                .filter(|(port, _)| expected_ports.contains(port))
                .collect();
            if bound.len() == expected_ports.len() {
                return Ok(bound);
            }
            if attempt < MAX_HOST_PORT_BINDING_CHECKS {
                tokio::time::sleep(TIME_BETWEEN_HOST_PORT_BINDING_CHECKS)
                    .await;
            }
        }
        Err(EngineError::PortBindingTimeout {
            container: container_name.to_string(),
            bound: bound.len(),
            expected: expected_ports.len(),
            attempts: MAX_HOST_PORT_BINDING_CHECKS + 1,
        })
    }

    /// Best-effort local compensation for a container whose setup failed
    /// partway. Failure to kill is logged, not returned: the caller's error
    /// is the one that matters.
    async fn destroy_failed_container(
        &self,
        container_id: &str,
        container_name: &str,
    ) {
        warn!(
            "killing container '{container_name}' ({container_id}) after a failed setup step"
        );
        if let Err(err) = self.client.kill_container(container_id).await {
            error!(
                "ACTION REQUIRED: failed to kill container '{container_name}' \
                 ({container_id}) after its setup failed; remove it manually: {err}"
            );
        }
    }

    /// The single network belonging to an enclave, or `None` if the enclave
    /// has no network. More than one match is an invariant violation.
    pub async fn maybe_enclave_network(
        &self,
        enclave_uuid: &str,
    ) -> Result<Option<Network>> {
        let filters = labels::enclave_resource_labels(
            enclave_uuid,
            ResourceType::EnclaveNetwork,
        );
        let mut networks = self.client.list_networks(&filters).await?;
        match networks.len() {
            0 => Ok(None),
            1 => Ok(networks.pop()),
            matches => Err(EngineError::SingletonViolation {
                what: "enclave network",
                filter: enclave_uuid.to_string(),
                matches,
            }),
        }
    }

    pub async fn enclave_network(
        &self,
        enclave_uuid: &str,
    ) -> Result<Network> {
        self.maybe_enclave_network(enclave_uuid).await?.ok_or_else(|| {
            EngineError::NotFound {
                what: "enclave network",
                filter: enclave_uuid.to_string(),
            }
        })
    }

    /// Every network this installation has created for an enclave. This is
    /// the source of truth for discovery; the in-memory registry is a cache.
    pub async fn list_enclave_networks(&self) -> Result<Vec<Network>> {
        let mut filters = labels::app_labels();
        let _ = filters.insert(
            labels::RESOURCE_TYPE_LABEL_KEY.to_string(),
            ResourceType::EnclaveNetwork.label_value().to_string(),
        );
        self.client.list_networks(&filters).await
    }

    pub async fn list_enclave_containers(
        &self,
        enclave_uuid: &str,
        include_stopped: bool,
    ) -> Result<Vec<Container>> {
        let filters = labels::enclave_labels(enclave_uuid);
        self.client.list_containers(&filters, include_stopped).await
    }

    pub async fn list_enclave_volumes(
        &self,
        enclave_uuid: &str,
    ) -> Result<Vec<Volume>> {
        let filters = labels::enclave_labels(enclave_uuid);
        self.client.list_volumes(&filters).await
    }

    /// Kills every running container in the enclave, then waits for each one
    /// to actually exit. Both phases fan out across the task runner and both
    /// collect every failure before reporting.
    pub async fn stop_enclave_containers(
        &self,
        enclave_uuid: &str,
    ) -> Result<()> {
        let running =
            self.list_enclave_containers(enclave_uuid, false).await?;
        let ids: Vec<String> =
            running.into_iter().map(|container| container.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        debug!(
            "stopping {} running containers in enclave '{enclave_uuid}'",
            ids.len()
        );

        let client = Arc::clone(&self.client);
        let kill_results = self
            .task_runner
            .run(ids, move |container_id: String| {
                let client = Arc::clone(&client);
                async move {
                    client
                        .kill_container(&container_id)
                        .await
                        .map_err(|err| anyhow!(err))
                }
            })
            .await;

        // Only wait on containers we actually managed to kill.
        let killed: Vec<String> =
            kill_results.succeeded.iter().cloned().collect();
        let client = Arc::clone(&self.client);
        let wait_results = self
            .task_runner
            .run(killed, move |container_id: String| {
                let client = Arc::clone(&client);
                async move {
                    client
                        .wait_for_exit(&container_id)
                        .await
                        .map_err(|err| anyhow!(err))
                }
            })
            .await;

        let failed_count =
            kill_results.failed.len() + wait_results.failed.len();
        if failed_count == 0 {
            return Ok(());
        }
        let mut details = kill_results.failure_details();
        if !wait_results.failed.is_empty() {
            if !details.is_empty() {
                details.push('\n');
            }
            details.push_str(&wait_results.failure_details());
        }
        Err(EngineError::PartialBatch {
            operation: "stop-enclave-containers",
            count: failed_count,
            details,
        })
    }

    /// Removes everything the enclave owns: containers (force), volumes, and
    /// finally the network. Partial failure reports every object that could
    /// not be removed; whatever was removed stays removed.
    pub async fn destroy_enclave_resources(
        &self,
        enclave_uuid: &str,
    ) -> Result<()> {
        let containers =
            self.list_enclave_containers(enclave_uuid, true).await?;
        let ids: Vec<String> =
            containers.into_iter().map(|container| container.id).collect();
        let client = Arc::clone(&self.client);
        let container_results = self
            .task_runner
            .run(ids, move |container_id: String| {
                let client = Arc::clone(&client);
                async move {
                    client
                        .remove_container(&container_id)
                        .await
                        .map_err(|err| anyhow!(err))
                }
            })
            .await;

        let volumes = self.list_enclave_volumes(enclave_uuid).await?;
        let names: Vec<String> =
            volumes.into_iter().map(|volume| volume.name).collect();
        let client = Arc::clone(&self.client);
        let volume_results = self
            .task_runner
            .run(names, move |volume_name: String| {
                let client = Arc::clone(&client);
                async move {
                    client
                        .remove_volume(&volume_name)
                        .await
                        .map_err(|err| anyhow!(err))
                }
            })
            .await;

        let mut details = container_results.failure_details();
        let mut failed_count =
            container_results.failed.len() + volume_results.failed.len();
        if !volume_results.failed.is_empty() {
            if !details.is_empty() {
                details.push('\n');
            }
            details.push_str(&volume_results.failure_details());
        }

        // The network only comes down once nothing is attached to it, so it
        // goes last and is skipped when containers failed to remove.
        if failed_count == 0 {
            if let Some(network) =
                self.maybe_enclave_network(enclave_uuid).await?
            {
                if let Err(err) =
                    self.client.remove_network(&network.id).await
                {
                    failed_count += 1;
                    if !details.is_empty() {
                        details.push('\n');
                    }
                    details.push_str(&format!("{}: {err}", network.name));
                }
            }
        }

        if failed_count == 0 {
            info!("removed all resources of enclave '{enclave_uuid}'");
            return Ok(());
        }
        Err(EngineError::PartialBatch {
            operation: "destroy-enclave-resources",
            count: failed_count,
            details,
        })
    }
}

/// Engines treat an untagged image reference as `latest` but report it back
/// tagged, which would break the exists-before-pull check.
fn normalize_image_tag(image: &str) -> String {
    let after_registry =
        image.rsplit('/').next().unwrap_or(image);
    if after_registry.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    }
}
