/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

use super::error::Result;
use super::types::{
    Container, ContainerPort, ExecOutput, Network, PortPublishSpec, Volume,
};

/// What a concrete engine can and cannot do. The manager consults this when
/// deciding which optional machinery (sidecar, data volume, pool) to run.
#[derive(Debug, Clone, Copy)]
pub struct EngineCapabilities {
    /// The engine has no native log shipping; each enclave needs a dedicated
    /// log-shipping sidecar container.
    pub needs_logs_collector: bool,
    /// The engine needs a per-enclave data volume created alongside the
    /// network.
    pub needs_enclave_data_volume: bool,
    /// Enclave creation is slow enough that pre-warming a pool pays off.
    pub expensive_enclave_creation: bool,
    /// Networks can be renamed in place. Required for handing out pooled
    /// enclaves under a caller-chosen name.
    pub supports_network_rename: bool,
}

/// Everything needed to create one container. Plain data; the adapter owns
/// the ordering and retry logic around it.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network_id: Option<String>,
    pub static_ip: Option<IpAddr>,
    pub network_alias: Option<String>,
    pub env: HashMap<String, String>,
    pub ports: HashMap<ContainerPort, PortPublishSpec>,
    /// `(host path or volume name, container path)` pairs.
    pub mounts: Vec<(String, String)>,
    pub cmd: Option<Vec<String>>,
    pub labels: HashMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        ContainerSpec {
            name: name.into(),
            image: image.into(),
            network_id: None,
            static_ip: None,
            network_alias: None,
            env: HashMap::new(),
            ports: HashMap::new(),
            mounts: Vec::new(),
            cmd: None,
            labels: HashMap::new(),
        }
    }

    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn with_static_ip(mut self, ip: IpAddr) -> Self {
        self.static_ip = Some(ip);
        self
    }

    pub fn with_env(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_port(
        mut self,
        port: ContainerPort,
        publish: PortPublishSpec,
    ) -> Self {
        let _ = self.ports.insert(port, publish);
        self
    }

    pub fn with_mount(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.mounts.push((source.into(), target.into()));
        self
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }
}

/// The raw container-engine contract.
///
/// Implementations are thin translations to the engine's API; they must not
/// add retry or compensation logic; that belongs to
/// [`super::EngineAdapter`]. Label-based filtering is the sole discovery
/// mechanism, so every list operation takes a label filter.
#[async_trait]
pub trait EngineClient: Send + Sync {
    fn engine_name(&self) -> &'static str;

    fn capabilities(&self) -> EngineCapabilities;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Creates the container object without starting it.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    async fn stop_container(&self, container_id: &str) -> Result<()>;

    async fn kill_container(&self, container_id: &str) -> Result<()>;

    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Blocks until the container is no longer running.
    async fn wait_for_exit(&self, container_id: &str) -> Result<()>;

    async fn inspect_container(&self, container_id: &str)
        -> Result<Container>;

    async fn list_containers(
        &self,
        label_filters: &HashMap<String, String>,
        include_stopped: bool,
    ) -> Result<Vec<Container>>;

    async fn connect_container_to_network(
        &self,
        network_id: &str,
        container_id: &str,
        static_ip: Option<IpAddr>,
        alias: Option<&str>,
    ) -> Result<()>;

    async fn exec_command(
        &self,
        container_id: &str,
        cmd: &[String],
    ) -> Result<ExecOutput>;

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String>;

    async fn remove_network(&self, network_id: &str) -> Result<()>;

    /// Engines that cannot rename report [`super::EngineError::Unsupported`];
    /// such engines also report cheap creation, so the pool (the only rename
    /// caller) never runs on them.
    async fn rename_network(
        &self,
        network_id: &str,
        new_name: &str,
    ) -> Result<()>;

    async fn network_exists(&self, network_id: &str) -> Result<bool>;

    async fn list_networks(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Network>>;

    /// Creating a volume whose name already exists is a no-op at the engine
    /// level; callers rely on that idempotence for re-entrant setup.
    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<()>;

    async fn remove_volume(&self, volume_name: &str) -> Result<()>;

    async fn list_volumes(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Volume>>;
}
