/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! The mutating façade over enclaves.
//!
//! Every mutating operation holds one manager-wide mutex for its full
//! duration. The engine offers no compare-and-swap, and concurrent mutation
//! of overlapping label sets is unsafe, so the lock is deliberately coarse.
//! Each operation also re-discovers engine state first: the engine, not the
//! in-memory registry, is the source of truth.

use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::engine::labels::{
    ENCLAVE_MODE_LABEL_KEY, ENCLAVE_NETWORK_NAME_PREFIX,
    ENCLAVE_UUID_LABEL_KEY, PORT_SPECS_LABEL_KEY, PRIVATE_IP_LABEL_KEY,
    PRIVATE_PORT_LABEL_KEY, RESOURCE_TYPE_LABEL_KEY,
};
use crate::engine::{labels, Container, EngineAdapter};
use crate::tasks::TaskRunner;

use super::collaborators::LogArtifactRemover;
use super::creator::{CreateEnclaveArgs, EnclaveCreator};
use super::enclave::{
    ControlContainerInfo, Enclave, EnclaveMode, EnclaveStatus, EnclaveUuid,
};
use super::enclave_name::EnclaveName;
use super::error::{EnclaveError, Result};
use super::name_generator::NameGenerator;
use super::pool::EnclavePool;
use super::registry::{HistoricalIdentifier, HistoricalRegistry};

const MAX_NAME_GENERATION_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct CreateEnclaveOptions {
    /// Omitted means "generate a themed name for me".
    pub name: Option<String>,
    pub control_version_tag: Option<String>,
    pub log_level: String,
    pub production: bool,
    pub debug_mode: bool,
}

impl Default for CreateEnclaveOptions {
    fn default() -> Self {
        CreateEnclaveOptions {
            name: None,
            control_version_tag: None,
            log_level: "info".to_string(),
            production: false,
            debug_mode: false,
        }
    }
}

/// What [`EnclaveManager::clean`] reports per removed enclave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEnclave {
    pub name: EnclaveName,
    pub uuid: EnclaveUuid,
}

pub struct EnclaveManager {
    adapter: EngineAdapter,
    creator: Arc<EnclaveCreator>,
    pool: Option<EnclavePool>,
    name_generator: Arc<dyn NameGenerator>,
    log_artifacts: Arc<dyn LogArtifactRemover>,
    task_runner: TaskRunner,
    registry: Mutex<HistoricalRegistry>,
}

impl EnclaveManager {
    pub fn new(
        adapter: EngineAdapter,
        creator: Arc<EnclaveCreator>,
        pool: Option<EnclavePool>,
        name_generator: Arc<dyn NameGenerator>,
        log_artifacts: Arc<dyn LogArtifactRemover>,
        task_runner: TaskRunner,
    ) -> Self {
        EnclaveManager {
            adapter,
            creator,
            pool,
            name_generator,
            log_artifacts,
            task_runner,
            registry: Mutex::new(HistoricalRegistry::new()),
        }
    }

    pub async fn create(
        &self,
        options: CreateEnclaveOptions,
    ) -> Result<Enclave> {
        let mut registry = self.registry.lock().await;
        let _ = self.snapshot(&mut registry).await?;

        let name = match &options.name {
            Some(name) => {
                let name = EnclaveName::new(name.clone())?;
                if registry.is_name_live(name.as_str()) {
                    return Err(EnclaveError::NameTaken {
                        name: name.into_inner(),
                    });
                }
                name
            }
            None => self.generate_unique_name(&registry)?,
        };

        let mode = if options.production {
            EnclaveMode::Production
        } else {
            EnclaveMode::Test
        };

        // Production enclaves never come from the pool; pooled ones were
        // created with test-mode defaults.
        if !options.production {
            if let Some(pool) = &self.pool {
                match pool.get_enclave(&name).await {
                    Ok(enclave) => {
                        registry
                            .record(enclave.uuid.clone(), name.clone());
                        return Ok(enclave);
                    }
                    Err(err) => {
                        warn!(
                            "pool could not supply '{name}', creating directly: {err}"
                        );
                    }
                }
            }
        }

        let args = CreateEnclaveArgs {
            name: name.clone(),
            mode,
            log_level: options.log_level.clone(),
            debug_mode: options.debug_mode,
            control_version_tag: options.control_version_tag.clone(),
        };
        let enclave = self.creator.create_enclave(&args).await?;
        registry.record(enclave.uuid.clone(), name);
        Ok(enclave)
    }

    /// All live enclaves, reconstructed from engine labels. This is also the
    /// backfill path after a restart: the first call seeds the historical
    /// registry from engine state.
    pub async fn get_enclaves(
        &self,
    ) -> Result<HashMap<EnclaveUuid, Enclave>> {
        let mut registry = self.registry.lock().await;
        self.snapshot(&mut registry).await
    }

    pub async fn get_historical_identifiers(
        &self,
    ) -> Result<Vec<HistoricalIdentifier>> {
        let mut registry = self.registry.lock().await;
        let _ = self.snapshot(&mut registry).await?;
        Ok(registry.history().to_vec())
    }

    /// Kills every container in the enclave and waits for them to exit. The
    /// network and volumes stay; the enclave becomes `Stopped`.
    pub async fn stop(&self, identifier: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let _ = self.snapshot(&mut registry).await?;
        let uuid = self.resolve_live(&registry, identifier)?;
        info!("stopping enclave '{}'", uuid.shortened());
        self.adapter
            .stop_enclave_containers(uuid.as_str())
            .await
            .map_err(|err| EnclaveError::backend(uuid.as_str(), err))
    }

    /// Removes every engine resource the enclave owns, then its local log
    /// artifacts. The identity stays in the historical registry.
    pub async fn destroy(&self, identifier: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let _ = self.snapshot(&mut registry).await?;
        let uuid = self.resolve_live(&registry, identifier)?;
        info!("destroying enclave '{}'", uuid.shortened());
        self.adapter
            .destroy_enclave_resources(uuid.as_str())
            .await
            .map_err(|err| EnclaveError::backend(uuid.as_str(), err))?;
        registry.mark_destroyed(&uuid);
        self.remove_log_artifacts(&uuid).await;
        Ok(())
    }

    /// Destroys all enclaves (or only stopped and empty ones) in parallel.
    /// Failures never hide each other: every failing enclave is listed in
    /// the aggregated error, and everything that was removed stays removed.
    pub async fn clean(
        &self,
        clean_all: bool,
    ) -> Result<Vec<RemovedEnclave>> {
        let mut registry = self.registry.lock().await;
        let enclaves = self.snapshot(&mut registry).await?;

        let targets: HashMap<EnclaveUuid, EnclaveName> = enclaves
            .values()
            .filter(|enclave| {
                clean_all
                    || matches!(
                        enclave.status,
                        EnclaveStatus::Stopped | EnclaveStatus::Empty
                    )
            })
            .map(|enclave| (enclave.uuid.clone(), enclave.name.clone()))
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        info!("cleaning {} enclaves (all: {clean_all})", targets.len());

        let adapter = self.adapter.clone();
        let results = self
            .task_runner
            .run(
                targets.keys().cloned().collect(),
                move |uuid: EnclaveUuid| {
                    let adapter = adapter.clone();
                    async move {
                        adapter
                            .destroy_enclave_resources(uuid.as_str())
                            .await
                            .map_err(|err| anyhow!(err))
                    }
                },
            )
            .await;

        let mut removed = Vec::new();
        for uuid in &results.succeeded {
            registry.mark_destroyed(uuid);
            self.remove_log_artifacts(uuid).await;
            if let Some(name) = targets.get(uuid) {
                removed.push(RemovedEnclave {
                    name: name.clone(),
                    uuid: uuid.clone(),
                });
            }
        }

        if results.failed.is_empty() {
            Ok(removed)
        } else {
            Err(EnclaveError::Bulk {
                operation: "clean",
                count: results.failed.len(),
                details: results.failure_details(),
            })
        }
    }

    /// Stops the pool filler, if any. Idle enclaves still buffered stay on
    /// the engine and are swept at the next startup.
    pub async fn shutdown(self) {
        if let Some(pool) = self.pool {
            pool.shutdown().await;
        }
    }

    async fn remove_log_artifacts(&self, uuid: &EnclaveUuid) {
        if let Err(err) = self.log_artifacts.remove(uuid).await {
            warn!(
                "could not remove log artifacts of enclave '{}': {err:#}",
                uuid.shortened()
            );
        }
    }

    fn resolve_live(
        &self,
        registry: &HistoricalRegistry,
        identifier: &str,
    ) -> Result<EnclaveUuid> {
        let uuid = registry.resolve(identifier)?;
        if !registry.is_live(&uuid) {
            return Err(EnclaveError::NotFound {
                identifier: identifier.to_string(),
            });
        }
        Ok(uuid)
    }

    fn generate_unique_name(
        &self,
        registry: &HistoricalRegistry,
    ) -> Result<EnclaveName> {
        let mut candidate = self.name_generator.generate();
        for _ in 0..MAX_NAME_GENERATION_RETRIES {
            if !registry.is_name_live(&candidate) {
                return EnclaveName::new(candidate);
            }
            candidate = self.name_generator.generate();
        }
        // All candidates collided; fall back to a deterministic suffix on
        // the last one.
        let mut suffix = 1u32;
        loop {
            let fallback = format!("{candidate}-{suffix}");
            if !registry.is_name_live(&fallback) {
                return EnclaveName::new(fallback);
            }
            suffix += 1;
        }
    }

    /// Rebuilds the live view from engine labels and syncs the registry both
    /// ways: discovered enclaves become live entries, registry entries with
    /// no engine resources are marked destroyed.
    async fn snapshot(
        &self,
        registry: &mut HistoricalRegistry,
    ) -> Result<HashMap<EnclaveUuid, Enclave>> {
        let discovered = self.discover().await?;
        registry.backfill(
            discovered
                .iter()
                .map(|(uuid, enclave)| (uuid.clone(), enclave.name.clone())),
        );
        for uuid in registry.live_uuids() {
            if !discovered.contains_key(&uuid) {
                registry.mark_destroyed(&uuid);
            }
        }
        Ok(discovered)
    }

    async fn discover(&self) -> Result<HashMap<EnclaveUuid, Enclave>> {
        let networks =
            self.adapter.list_enclave_networks().await.map_err(|err| {
                EnclaveError::backend("discovery", err)
            })?;

        let mut enclaves = HashMap::new();
        for network in networks {
            let Some(uuid) = network.labels.get(ENCLAVE_UUID_LABEL_KEY)
            else {
                warn!(
                    "enclave network '{}' carries no uuid label, skipping",
                    network.name
                );
                continue;
            };
            let uuid = EnclaveUuid::from(uuid.clone());
            let raw_name = network
                .name
                .strip_prefix(ENCLAVE_NETWORK_NAME_PREFIX)
                .unwrap_or(&network.name);
            let Ok(name) = EnclaveName::new(raw_name) else {
                warn!(
                    "enclave network '{}' has an unusable name, skipping",
                    network.name
                );
                continue;
            };
            let mode = network
                .labels
                .get(ENCLAVE_MODE_LABEL_KEY)
                .map(|value| EnclaveMode::from_label_value(value))
                .unwrap_or(EnclaveMode::Test);

            let containers = self
                .adapter
                .list_enclave_containers(uuid.as_str(), true)
                .await
                .map_err(|err| EnclaveError::backend(uuid.as_str(), err))?;
            let status = if containers.is_empty() {
                EnclaveStatus::Empty
            } else if containers.iter().any(|c| c.status.is_running()) {
                EnclaveStatus::Running
            } else {
                EnclaveStatus::Stopped
            };

            let control_container = containers
                .iter()
                .find(|container| {
                    container.status.is_running()
                        && container
                            .labels
                            .get(RESOURCE_TYPE_LABEL_KEY)
                            .map(String::as_str)
                            == Some(
                                labels::ResourceType::ControlContainer
                                    .label_value(),
                            )
                })
                .and_then(|container| {
                    reconstruct_control_info(container, &network.id)
                });

            let _ = enclaves.insert(
                uuid.clone(),
                Enclave {
                    uuid,
                    name,
                    status,
                    mode,
                    creation_time: network.created,
                    control_container,
                },
            );
        }
        Ok(enclaves)
    }
}

/// Rebuilds [`ControlContainerInfo`] from engine state plus the labels the
/// control container was stamped with at launch. Missing pieces mean the
/// info is unusable and the enclave is reported without it.
fn reconstruct_control_info(
    container: &Container,
    network_id: &str,
) -> Option<ControlContainerInfo> {
    let private_ip = container
        .network_ips
        .get(network_id)
        .cloned()
        .or_else(|| container.labels.get(PRIVATE_IP_LABEL_KEY).cloned())?;
    let private_port = match container.labels.get(PRIVATE_PORT_LABEL_KEY) {
        Some(label) => label.parse().ok()?,
        // Launchers that don't label the port directly still stamp the
        // serialized port specs.
        None => {
            let serialized = container.labels.get(PORT_SPECS_LABEL_KEY)?;
            let specs = labels::deserialize_port_specs(serialized).ok()?;
            let mut ports: Vec<_> = specs.keys().copied().collect();
            ports.sort_by_key(|port| (port.number, port.protocol as u8));
            *ports.first()?
        }
    };
    let binding = container.port_bindings.get(&private_port);
    Some(ControlContainerInfo {
        container_id: container.id.clone(),
        private_ip,
        private_port,
        public_ip: binding.map(|b| {
            if b.host_ip.is_empty() {
                "0.0.0.0".to_string()
            } else {
                b.host_ip.clone()
            }
        }),
        public_port: binding.map(|b| b.host_port),
        bridge_ip: None,
    })
}
