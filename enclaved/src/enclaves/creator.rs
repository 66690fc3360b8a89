/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! All-or-nothing enclave creation.
//!
//! Forward steps run in order: network, data volume, logs-collector sidecar,
//! control container. Each step that creates something pushes a named
//! compensating action; any later failure unwinds the stack in reverse
//! order. A compensation that itself fails is never retried (the resource is
//! in an undefined state) and turns the result into
//! [`EnclaveError::PartialFailure`], which names the orphaned uuid.

use backoff::ExponentialBackoff;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::engine::labels::{
    self, ResourceType, ENCLAVE_NETWORK_NAME_PREFIX,
};
use crate::engine::EngineAdapter;

use super::collaborators::{
    ControlContainer, ControlContainerLauncher, LaunchArgs, LogsCollector,
};
use super::enclave::{
    ControlContainerInfo, Enclave, EnclaveMode, EnclaveStatus, EnclaveUuid,
};
use super::enclave_name::EnclaveName;
use super::error::{EnclaveError, Result};

/// The sidecar needs a moment before its health endpoint exists at all.
const SIDECAR_HEALTH_INITIAL_DELAY: Duration = Duration::from_millis(500);
const SIDECAR_HEALTH_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const SIDECAR_HEALTH_RETRIES: u32 = 10;

type CompensationFuture = BoxFuture<'static, anyhow::Result<()>>;
type CompensationAction = Box<dyn FnOnce() -> CompensationFuture + Send>;

/// Ordered list of undo actions. Pushed as forward steps succeed, executed
/// in reverse on failure, cleared on success.
struct CompensationStack {
    actions: Vec<(&'static str, CompensationAction)>,
}

impl CompensationStack {
    fn new() -> Self {
        CompensationStack { actions: Vec::new() }
    }

    fn push<F>(&mut self, step: &'static str, action: F)
    where
        F: FnOnce() -> CompensationFuture + Send + 'static,
    {
        self.actions.push((step, Box::new(action)));
    }

    fn disarm(&mut self) {
        self.actions.clear();
    }

    async fn unwind(&mut self) -> Vec<(&'static str, anyhow::Error)> {
        let mut failures = Vec::new();
        while let Some((step, action)) = self.actions.pop() {
            if let Err(err) = action().await {
                error!("rollback step '{step}' failed: {err:#}");
                failures.push((step, err));
            }
        }
        failures
    }
}

#[derive(Debug, Clone)]
pub struct CreateEnclaveArgs {
    pub name: EnclaveName,
    pub mode: EnclaveMode,
    pub log_level: String,
    pub debug_mode: bool,
    pub control_version_tag: Option<String>,
}

pub struct EnclaveCreator {
    adapter: EngineAdapter,
    logs_collector: Arc<dyn LogsCollector>,
    launcher: Arc<dyn ControlContainerLauncher>,
}

impl EnclaveCreator {
    pub fn new(
        adapter: EngineAdapter,
        logs_collector: Arc<dyn LogsCollector>,
        launcher: Arc<dyn ControlContainerLauncher>,
    ) -> Self {
        EnclaveCreator { adapter, logs_collector, launcher }
    }

    pub async fn create_enclave(
        &self,
        args: &CreateEnclaveArgs,
    ) -> Result<Enclave> {
        let uuid = EnclaveUuid::generate();
        info!(
            "creating enclave '{}' ({}) in {:?} mode",
            args.name, uuid, args.mode
        );
        let mut stack = CompensationStack::new();
        let capabilities = self.adapter.capabilities();

        let mut network_labels = labels::enclave_resource_labels(
            uuid.as_str(),
            ResourceType::EnclaveNetwork,
        );
        let _ = network_labels.insert(
            labels::ENCLAVE_MODE_LABEL_KEY.to_string(),
            args.mode.label_value().to_string(),
        );
        let network_name =
            format!("{ENCLAVE_NETWORK_NAME_PREFIX}{}", args.name);
        let network_id = self
            .adapter
            .client()
            .create_network(&network_name, &network_labels)
            .await
            .map_err(|err| EnclaveError::backend(uuid.as_str(), err))?;
        // From here on, everything the enclave owns carries the uuid label,
        // so one blanket teardown ends the unwind.
        {
            let adapter = self.adapter.clone();
            let uuid = uuid.clone();
            stack.push("destroy-enclave-resources", move || {
                Box::pin(async move {
                    adapter
                        .destroy_enclave_resources(uuid.as_str())
                        .await
                        .map_err(anyhow::Error::from)
                })
            });
        }

        if capabilities.needs_enclave_data_volume {
            let volume_labels = labels::enclave_resource_labels(
                uuid.as_str(),
                ResourceType::EnclaveDataVolume,
            );
            let volume_name = format!("enclave-data-{}", uuid.shortened());
            if let Err(err) = self
                .adapter
                .client()
                .create_volume(&volume_name, &volume_labels)
                .await
            {
                return Err(self
                    .fail(&uuid, EnclaveError::backend(uuid.as_str(), err), &mut stack)
                    .await);
            }
        }

        if capabilities.needs_logs_collector {
            let handle = match self
                .logs_collector
                .create_and_start(&uuid, &network_id)
                .await
            {
                Ok(handle) => handle,
                Err(err) => {
                    return Err(self
                        .fail(
                            &uuid,
                            EnclaveError::Collaborator {
                                step: "start-logs-collector",
                                enclave: uuid.to_string(),
                                source: err,
                            },
                            &mut stack,
                        )
                        .await);
                }
            };
            {
                let logs_collector = Arc::clone(&self.logs_collector);
                let handle = handle.clone();
                stack.push("destroy-logs-collector", move || {
                    Box::pin(async move {
                        logs_collector.destroy(&handle).await
                    })
                });
            }

            if let Err(err) = self.wait_for_sidecar_health(&handle).await {
                return Err(self
                    .fail(
                        &uuid,
                        EnclaveError::Collaborator {
                            step: "logs-collector-health",
                            enclave: uuid.to_string(),
                            source: err,
                        },
                        &mut stack,
                    )
                    .await);
            }
        }

        let launch_args = LaunchArgs {
            enclave_uuid: uuid.clone(),
            network_id: network_id.clone(),
            log_level: args.log_level.clone(),
            debug_mode: args.debug_mode,
            production: args.mode.is_production(),
        };
        let control = match self.launch_control(args, &launch_args).await {
            Ok(control) => control,
            Err(err) => {
                return Err(self
                    .fail(
                        &uuid,
                        EnclaveError::Collaborator {
                            step: "launch-control-container",
                            enclave: uuid.to_string(),
                            source: err,
                        },
                        &mut stack,
                    )
                    .await);
            }
        };
        {
            let adapter = self.adapter.clone();
            let container_id = control.container_id.clone();
            stack.push("kill-control-container", move || {
                Box::pin(async move {
                    adapter
                        .client()
                        .kill_container(&container_id)
                        .await
                        .map_err(anyhow::Error::from)
                })
            });
        }

        // The network's engine-reported timestamp is the enclave's creation
        // time; reading it back is the last fallible step.
        let network = match self.adapter.enclave_network(uuid.as_str()).await
        {
            Ok(network) => network,
            Err(err) => {
                return Err(self
                    .fail(
                        &uuid,
                        EnclaveError::backend(uuid.as_str(), err),
                        &mut stack,
                    )
                    .await);
            }
        };

        stack.disarm();
        info!("enclave '{}' ({}) is running", args.name, uuid.shortened());
        Ok(Enclave {
            uuid,
            name: args.name.clone(),
            status: EnclaveStatus::Running,
            mode: args.mode,
            creation_time: network.created,
            control_container: Some(ControlContainerInfo {
                container_id: control.container_id,
                private_ip: control.private_ip,
                private_port: control.private_port,
                public_ip: control.public_ip,
                public_port: control.public_port,
                bridge_ip: control.bridge_ip,
            }),
        })
    }

    async fn launch_control(
        &self,
        args: &CreateEnclaveArgs,
        launch_args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer> {
        match &args.control_version_tag {
            Some(version_tag) => {
                self.launcher
                    .launch_with_custom_version(version_tag, launch_args)
                    .await
            }
            None => {
                self.launcher.launch_with_default_version(launch_args).await
            }
        }
    }

    /// Constant-interval retry; elapsed-time bound covers all retries.
    async fn wait_for_sidecar_health(
        &self,
        handle: &super::collaborators::LogsCollectorHandle,
    ) -> anyhow::Result<()> {
        tokio::time::sleep(SIDECAR_HEALTH_INITIAL_DELAY).await;
        let policy = ExponentialBackoff {
            initial_interval: SIDECAR_HEALTH_RETRY_INTERVAL,
            randomization_factor: 0.0,
            multiplier: 1.0,
            max_interval: SIDECAR_HEALTH_RETRY_INTERVAL,
            max_elapsed_time: Some(
                SIDECAR_HEALTH_RETRY_INTERVAL * SIDECAR_HEALTH_RETRIES,
            ),
            ..ExponentialBackoff::default()
        };
        backoff::future::retry(policy, || async {
            self.logs_collector
                .check_health(handle)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
    }

    /// Unwinds the stack and decides what the caller sees: the original
    /// failure when rollback was clean, a PartialFailure naming the orphan
    /// when it was not.
    async fn fail(
        &self,
        uuid: &EnclaveUuid,
        cause: EnclaveError,
        stack: &mut CompensationStack,
    ) -> EnclaveError {
        warn!(
            "enclave '{}' creation failed, rolling back: {cause}",
            uuid.shortened()
        );
        let failures = stack.unwind().await;
        if failures.is_empty() {
            return cause;
        }
        let mut details = format!("original failure: {cause}");
        for (step, err) in failures {
            details.push_str(&format!("\nrollback '{step}' failed: {err:#}"));
        }
        EnclaveError::PartialFailure {
            enclave_uuid: uuid.to_string(),
            details,
        }
    }
}
