/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! In-memory [`EngineClient`] for tests. Behaves like a cooperative engine
//! by default; individual failure modes are switched on per test.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::client::{ContainerSpec, EngineCapabilities, EngineClient};
use super::error::{EngineError, Result};
use super::types::{
    Container, ContainerStatus, ExecOutput, HostBinding, Network,
    PortPublishSpec, Volume,
};

const AUTO_PUBLISH_PORT_BASE: u16 = 49000;

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, Container>,
    networks: HashMap<String, Network>,
    volumes: HashMap<String, Volume>,
    pulled_images: HashSet<String>,
    killed: Vec<String>,
    events: Vec<String>,
    fail_kills: HashSet<String>,
    fail_removals: HashSet<String>,
    fail_create_network: bool,
    next_id: u32,
    next_ip_octet: u8,
}

pub struct FakeEngine {
    state: Mutex<FakeState>,
    inspect_count: AtomicU32,
    // Number of upcoming inspections that hide host port bindings.
    binding_delay: AtomicU32,
    pool_capable: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine {
            state: Mutex::new(FakeState::default()),
            inspect_count: AtomicU32::new(0),
            binding_delay: AtomicU32::new(0),
            pool_capable: AtomicBool::new(false),
        }
    }

    /// Report network renames and expensive enclave creation, which is what
    /// lets the warm pool activate.
    pub fn enable_pool_capabilities(&self) {
        self.pool_capable.store(true, Ordering::SeqCst);
    }

    /// The next `inspections` calls to `inspect_container` report no host
    /// port bindings, mimicking the engine's publish lag.
    pub fn delay_port_bindings(&self, inspections: u32) {
        self.binding_delay.store(inspections, Ordering::SeqCst);
    }

    pub fn fail_kills_for(&self, container_names: &[&str]) {
        let mut state = self.lock();
        for name in container_names {
            let _ = state.fail_kills.insert((*name).to_string());
        }
    }

    pub fn fail_removals_for(&self, container_names: &[&str]) {
        let mut state = self.lock();
        for name in container_names {
            let _ = state.fail_removals.insert((*name).to_string());
        }
    }

    pub fn fail_network_creation(&self) {
        self.lock().fail_create_network = true;
    }

    pub fn inspect_count(&self) -> u32 {
        self.inspect_count.load(Ordering::SeqCst)
    }

    pub fn pulled_images(&self) -> HashSet<String> {
        self.lock().pulled_images.clone()
    }

    pub fn container(&self, container_id: &str) -> Option<Container> {
        self.lock().containers.get(container_id).cloned()
    }

    pub fn container_by_name(&self, name: &str) -> Option<Container> {
        self.lock().containers.values().find(|c| c.name == name).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    pub fn volume_count(&self) -> usize {
        self.lock().volumes.len()
    }

    pub fn network_count(&self) -> usize {
        self.lock().networks.len()
    }

    pub fn network_by_name(&self, name: &str) -> Option<Network> {
        self.lock().networks.values().find(|n| n.name == name).cloned()
    }

    /// Names of containers that were explicitly killed, in kill order.
    pub fn killed_containers(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    /// Mutating engine calls in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fail(operation: &'static str, object: &str, reason: &str) -> EngineError {
        EngineError::backend(
            operation,
            object,
            anyhow::anyhow!("{reason}"),
        )
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        FakeEngine::new()
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    fn engine_name(&self) -> &'static str {
        "fake"
    }

    fn capabilities(&self) -> EngineCapabilities {
        let pool_capable = self.pool_capable.load(Ordering::SeqCst);
        EngineCapabilities {
            needs_logs_collector: true,
            needs_enclave_data_volume: true,
            expensive_enclave_creation: pool_capable,
            supports_network_rename: pool_capable,
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.lock().pulled_images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("pull-image {image}"));
        let _ = state.pulled_images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(Self::fail(
                "create-container",
                &spec.name,
                "container name already in use",
            ));
        }

        let mut network_ips = HashMap::new();
        if let Some(network_id) = &spec.network_id {
            if !state.networks.contains_key(network_id) {
                return Err(Self::fail(
                    "create-container",
                    &spec.name,
                    "no such network",
                ));
            }
            state.next_ip_octet = state.next_ip_octet.wrapping_add(1);
            let ip = match spec.static_ip {
                Some(ip) => ip.to_string(),
                None => format!("172.18.0.{}", state.next_ip_octet),
            };
            let _ = network_ips.insert(network_id.clone(), ip);
        }

        state.next_id += 1;
        let container_id = format!("container-{}", state.next_id);
        let mut port_bindings = HashMap::new();
        for (port, publish) in &spec.ports {
            let host_port = match publish {
                PortPublishSpec::NoPublish => continue,
                PortPublishSpec::AutoPublish => {
                    AUTO_PUBLISH_PORT_BASE + state.next_id as u16
                }
                PortPublishSpec::ToHostPort(host_port) => *host_port,
            };
            let _ = port_bindings.insert(
                *port,
                HostBinding { host_ip: "0.0.0.0".to_string(), host_port },
            );
        }

        state.events.push(format!("create-container {}", spec.name));
        let _ = state.containers.insert(
            container_id.clone(),
            Container {
                id: container_id.clone(),
                name: spec.name.clone(),
                status: ContainerStatus::Created,
                labels: spec.labels.clone(),
                port_bindings,
                network_ips,
            },
        );
        Ok(container_id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("start-container {container_id}"));
        let container =
            state.containers.get_mut(container_id).ok_or_else(|| {
                Self::fail("start-container", container_id, "no such container")
            })?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("stop-container {container_id}"));
        let container =
            state.containers.get_mut(container_id).ok_or_else(|| {
                Self::fail("stop-container", container_id, "no such container")
            })?;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn kill_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.lock();
        let name = state
            .containers
            .get(container_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Self::fail("kill-container", container_id, "no such container")
            })?;
        if state.fail_kills.contains(&name) {
            return Err(Self::fail(
                "kill-container",
                &name,
                "injected kill failure",
            ));
        }
        state.events.push(format!("kill-container {name}"));
        state.killed.push(name);
        if let Some(container) = state.containers.get_mut(container_id) {
            container.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.lock();
        let name = state
            .containers
            .get(container_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Self::fail(
                    "remove-container",
                    container_id,
                    "no such container",
                )
            })?;
        if state.fail_removals.contains(&name) {
            return Err(Self::fail(
                "remove-container",
                &name,
                "injected removal failure",
            ));
        }
        state.events.push(format!("remove-container {name}"));
        let _ = state.containers.remove(container_id);
        Ok(())
    }

    async fn wait_for_exit(&self, _container_id: &str) -> Result<()> {
        // Kills take effect synchronously here, so there is nothing to wait
        // on by the time this runs.
        Ok(())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<Container> {
        let _ = self.inspect_count.fetch_add(1, Ordering::SeqCst);
        let mut container =
            self.lock().containers.get(container_id).cloned().ok_or_else(
                || {
                    Self::fail(
                        "inspect-container",
                        container_id,
                        "no such container",
                    )
                },
            )?;
        let delay = self.binding_delay.load(Ordering::SeqCst);
        if delay > 0 {
            let _ = self.binding_delay.compare_exchange(
                delay,
                delay.saturating_sub(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            container.port_bindings.clear();
        }
        Ok(container)
    }

    async fn list_containers(
        &self,
        label_filters: &HashMap<String, String>,
        include_stopped: bool,
    ) -> Result<Vec<Container>> {
        Ok(self
            .lock()
            .containers
            .values()
            .filter(|container| {
                (include_stopped || container.status.is_running())
                    && labels_match(&container.labels, label_filters)
            })
            .cloned()
            .collect())
    }

    async fn connect_container_to_network(
        &self,
        network_id: &str,
        container_id: &str,
        static_ip: Option<IpAddr>,
        _alias: Option<&str>,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.networks.contains_key(network_id) {
            return Err(Self::fail(
                "connect-network",
                network_id,
                "no such network",
            ));
        }
        state.next_ip_octet = state.next_ip_octet.wrapping_add(1);
        let ip = match static_ip {
            Some(ip) => ip.to_string(),
            None => format!("172.18.0.{}", state.next_ip_octet),
        };
        let container =
            state.containers.get_mut(container_id).ok_or_else(|| {
                Self::fail("connect-network", container_id, "no such container")
            })?;
        let _ = container.network_ips.insert(network_id.to_string(), ip);
        Ok(())
    }

    async fn exec_command(
        &self,
        container_id: &str,
        cmd: &[String],
    ) -> Result<ExecOutput> {
        let mut state = self.lock();
        if !state.containers.contains_key(container_id) {
            return Err(Self::fail("exec", container_id, "no such container"));
        }
        state.events.push(format!("exec {} {}", container_id, cmd.join(" ")));
        Ok(ExecOutput { exit_code: 0, output: String::new() })
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String> {
        let mut state = self.lock();
        if state.fail_create_network {
            return Err(Self::fail(
                "create-network",
                name,
                "injected network creation failure",
            ));
        }
        if state.networks.values().any(|n| n.name == name) {
            return Err(Self::fail(
                "create-network",
                name,
                "network name already in use",
            ));
        }
        state.next_id += 1;
        let network_id = format!("network-{}", state.next_id);
        state.events.push(format!("create-network {name}"));
        let _ = state.networks.insert(
            network_id.clone(),
            Network {
                id: network_id.clone(),
                name: name.to_string(),
                labels: labels.clone(),
                created: Some(chrono::Utc::now()),
            },
        );
        Ok(network_id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        let mut state = self.lock();
        let network = state.networks.remove(network_id).ok_or_else(|| {
            Self::fail("remove-network", network_id, "no such network")
        })?;
        state.events.push(format!("remove-network {}", network.name));
        Ok(())
    }

    async fn rename_network(
        &self,
        network_id: &str,
        new_name: &str,
    ) -> Result<()> {
        if !self.pool_capable.load(Ordering::SeqCst) {
            return Err(EngineError::Unsupported {
                engine: "fake",
                operation: "rename-network",
            });
        }
        let mut state = self.lock();
        state.events.push(format!("rename-network {network_id} {new_name}"));
        let network = state.networks.get_mut(network_id).ok_or_else(|| {
            Self::fail("rename-network", network_id, "no such network")
        })?;
        network.name = new_name.to_string();
        Ok(())
    }

    async fn network_exists(&self, network_id: &str) -> Result<bool> {
        Ok(self.lock().networks.contains_key(network_id))
    }

    async fn list_networks(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Network>> {
        Ok(self
            .lock()
            .networks
            .values()
            .filter(|network| labels_match(&network.labels, label_filters))
            .cloned()
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("create-volume {name}"));
        let _ = state.volumes.insert(
            name.to_string(),
            Volume { name: name.to_string(), labels: labels.clone() },
        );
        Ok(())
    }

    async fn remove_volume(&self, volume_name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.volumes.remove(volume_name).is_none() {
            return Err(Self::fail(
                "remove-volume",
                volume_name,
                "no such volume",
            ));
        }
        state.events.push(format!("remove-volume {volume_name}"));
        Ok(())
    }

    async fn list_volumes(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        Ok(self
            .lock()
            .volumes
            .values()
            .filter(|volume| labels_match(&volume.labels, label_filters))
            .cloned()
            .collect())
    }
}

fn labels_match(
    labels: &HashMap<String, String>,
    filters: &HashMap<String, String>,
) -> bool {
    filters
        .iter()
        .all(|(key, value)| labels.get(key).is_some_and(|v| v == value))
}
