/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Collaborator fakes for tests. They create real labeled objects in the
//! fake engine, so label-discovery queries in rollback and rediscovery tests
//! see the same state a real sidecar or launcher would leave behind.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::fake::FakeEngine;
use crate::engine::labels::{
    enclave_resource_labels, ResourceType, PRIVATE_PORT_LABEL_KEY,
};
use crate::engine::{
    ContainerPort, ContainerSpec, EngineClient, PortPublishSpec,
};

use super::collaborators::{
    ControlContainer, ControlContainerLauncher, LaunchArgs,
    LogArtifactRemover, LogsCollector, LogsCollectorHandle,
};
use super::enclave::EnclaveUuid;
use super::name_generator::NameGenerator;

const CONTROL_PORT: u16 = 7443;

pub(crate) struct FakeLogsCollector {
    engine: Arc<FakeEngine>,
    unhealthy_checks: AtomicU32,
    health_checks: AtomicU32,
    fail_create: AtomicBool,
    fail_destroy: AtomicBool,
}

impl FakeLogsCollector {
    pub(crate) fn new(engine: Arc<FakeEngine>) -> Self {
        FakeLogsCollector {
            engine,
            unhealthy_checks: AtomicU32::new(0),
            health_checks: AtomicU32::new(0),
            fail_create: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
        }
    }

    /// The next `count` health checks fail before checks start succeeding.
    pub(crate) fn fail_health_checks(&self, count: u32) {
        self.unhealthy_checks.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_destroys(&self) {
        self.fail_destroy.store(true, Ordering::SeqCst);
    }

    pub(crate) fn health_checks(&self) -> u32 {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogsCollector for FakeLogsCollector {
    async fn create_and_start(
        &self,
        enclave_uuid: &EnclaveUuid,
        network_id: &str,
    ) -> anyhow::Result<LogsCollectorHandle> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("injected sidecar creation failure"));
        }
        let spec = ContainerSpec::new(
            format!("logs-collector-{}", enclave_uuid.shortened()),
            "enclaved/logs-collector:latest",
        )
        .with_network(network_id)
        .with_labels(enclave_resource_labels(
            enclave_uuid.as_str(),
            ResourceType::LogsCollector,
        ));
        let container_id = self.engine.create_container(&spec).await?;
        self.engine.start_container(&container_id).await?;
        Ok(LogsCollectorHandle { container_id })
    }

    async fn check_health(
        &self,
        _handle: &LogsCollectorHandle,
    ) -> anyhow::Result<()> {
        let _ = self.health_checks.fetch_add(1, Ordering::SeqCst);
        let remaining = self.unhealthy_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            let _ = self.unhealthy_checks.compare_exchange(
                remaining,
                remaining.saturating_sub(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(anyhow!("sidecar not healthy yet"));
        }
        Ok(())
    }

    async fn destroy(
        &self,
        handle: &LogsCollectorHandle,
    ) -> anyhow::Result<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(anyhow!("injected sidecar destroy failure"));
        }
        self.engine.remove_container(&handle.container_id).await?;
        Ok(())
    }
}

pub(crate) struct FakeControlLauncher {
    engine: Arc<FakeEngine>,
    fail_launch: AtomicBool,
}

impl FakeControlLauncher {
    pub(crate) fn new(engine: Arc<FakeEngine>) -> Self {
        FakeControlLauncher { engine, fail_launch: AtomicBool::new(false) }
    }

    pub(crate) fn fail_launches(&self) {
        self.fail_launch.store(true, Ordering::SeqCst);
    }

    async fn launch(
        &self,
        args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(anyhow!("injected launch failure"));
        }
        let private_port = ContainerPort::tcp(CONTROL_PORT);
        let mut labels = enclave_resource_labels(
            args.enclave_uuid.as_str(),
            ResourceType::ControlContainer,
        );
        let _ = labels.insert(
            PRIVATE_PORT_LABEL_KEY.to_string(),
            private_port.to_string(),
        );
        let spec = ContainerSpec::new(
            format!("control-{}", args.enclave_uuid.shortened()),
            "enclaved/control:latest",
        )
        .with_network(&args.network_id)
        .with_port(private_port, PortPublishSpec::AutoPublish)
        .with_labels(labels);

        let container_id = self.engine.create_container(&spec).await?;
        self.engine.start_container(&container_id).await?;
        let container = self
            .engine
            .container(&container_id)
            .ok_or_else(|| anyhow!("container vanished after start"))?;
        let private_ip = container
            .network_ips
            .get(&args.network_id)
            .cloned()
            .unwrap_or_default();
        let binding = container.port_bindings.get(&private_port);
        Ok(ControlContainer {
            container_id,
            private_ip,
            private_port,
            public_ip: binding.map(|b| b.host_ip.clone()),
            public_port: binding.map(|b| b.host_port),
            bridge_ip: None,
        })
    }
}

#[async_trait]
impl ControlContainerLauncher for FakeControlLauncher {
    async fn launch_with_default_version(
        &self,
        args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer> {
        self.launch(args).await
    }

    async fn launch_with_custom_version(
        &self,
        _version_tag: &str,
        args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer> {
        self.launch(args).await
    }
}

#[derive(Default)]
pub(crate) struct FakeArtifactRemover {
    removed: Mutex<Vec<String>>,
}

impl FakeArtifactRemover {
    pub(crate) fn new() -> Self {
        FakeArtifactRemover::default()
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        match self.removed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LogArtifactRemover for FakeArtifactRemover {
    async fn remove(&self, enclave_uuid: &EnclaveUuid) -> anyhow::Result<()> {
        match self.removed.lock() {
            Ok(mut guard) => guard.push(enclave_uuid.as_str().to_string()),
            Err(poisoned) => poisoned
                .into_inner()
                .push(enclave_uuid.as_str().to_string()),
        }
        Ok(())
    }
}

/// Replays a fixed sequence of names, then repeats the default forever.
pub(crate) struct ScriptedNameGenerator {
    names: Mutex<VecDeque<String>>,
    default: String,
}

impl ScriptedNameGenerator {
    pub(crate) fn new(names: &[&str], default: &str) -> Self {
        ScriptedNameGenerator {
            names: Mutex::new(
                names.iter().map(|name| name.to_string()).collect(),
            ),
            default: default.to_string(),
        }
    }
}

impl NameGenerator for ScriptedNameGenerator {
    fn generate(&self) -> String {
        let next = match self.names.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| self.default.clone())
    }
}
