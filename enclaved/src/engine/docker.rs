/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Docker/Podman implementation of [`EngineClient`] over the bollard API.
//! Pure translation; all retry and compensation logic lives in the adapter.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions,
    ListContainersOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions,
};
use bollard::volume::{
    CreateVolumeOptions, ListVolumesOptions, RemoveVolumeOptions,
};
use bollard::models::{
    ContainerStateStatusEnum, ContainerSummary, EndpointIpamConfig,
    EndpointSettings, HostConfig, PortBinding as DockerPortBinding, PortMap,
};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, trace};

use super::client::{ContainerSpec, EngineCapabilities, EngineClient};
use super::error::{EngineError, Result};
use super::types::{
    Container, ContainerPort, ContainerStatus, ExecOutput, HostBinding,
    Network, Volume,
};

const ENGINE_NAME: &str = "docker";

/// Seconds Docker waits between SIGTERM and SIGKILL on stop.
const STOP_TIMEOUT_SECONDS: i64 = 30;

/// Host bindings are only meaningful on the wildcard interfaces; Docker also
/// reports per-interface bindings we don't hand out.
fn is_expected_host_interface(host_ip: &str) -> bool {
    host_ip.is_empty() || host_ip == "0.0.0.0" || host_ip == "::"
}

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects using the platform defaults (unix socket or named pipe).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            EngineError::backend("connect", "docker daemon", e)
        })?;
        Ok(DockerEngine { docker })
    }

    fn is_not_found(err: &bollard::errors::Error) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }
        )
    }
}

fn label_filters_to_docker(
    label_filters: &HashMap<String, String>,
) -> HashMap<String, Vec<String>> {
    let labels = label_filters
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    HashMap::from([("label".to_string(), labels)])
}

fn status_from_state_str(state: &str) -> ContainerStatus {
    match state {
        "created" => ContainerStatus::Created,
        "running" => ContainerStatus::Running,
        "restarting" => ContainerStatus::Restarting,
        "paused" => ContainerStatus::Paused,
        "removing" => ContainerStatus::Removing,
        "dead" => ContainerStatus::Dead,
        // "exited" and anything the engine invents later
        _ => ContainerStatus::Exited,
    }
}

fn status_from_inspect(status: Option<ContainerStateStatusEnum>) -> ContainerStatus {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
        Some(ContainerStateStatusEnum::RESTARTING) => {
            ContainerStatus::Restarting
        }
        Some(ContainerStateStatusEnum::PAUSED) => ContainerStatus::Paused,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Removing,
        Some(ContainerStateStatusEnum::DEAD) => ContainerStatus::Dead,
        Some(ContainerStateStatusEnum::EXITED)
        | Some(ContainerStateStatusEnum::EMPTY)
        | None => ContainerStatus::Exited,
    }
}

fn bindings_from_port_map(
    ports: Option<PortMap>,
) -> HashMap<ContainerPort, HostBinding> {
    let mut result = HashMap::new();
    let Some(ports) = ports else {
        return result;
    };
    for (port_str, bindings) in ports {
        let Ok(port) = port_str.parse::<ContainerPort>() else {
            trace!("skipping unparseable engine port '{port_str}'");
            continue;
        };
        let Some(bindings) = bindings else {
            continue;
        };
        let binding = bindings.iter().find_map(|b| {
            let host_ip = b.host_ip.clone().unwrap_or_default();
            if !is_expected_host_interface(&host_ip) {
                return None;
            }
            let host_port = b.host_port.as_ref()?.parse::<u16>().ok()?;
            Some(HostBinding { host_ip, host_port })
        });
        if let Some(binding) = binding {
            let _ = result.insert(port, binding);
        }
    }
    result
}

fn container_from_summary(summary: ContainerSummary) -> Container {
    let id = summary.id.unwrap_or_default();
    let name = summary
        .names
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();
    let status = summary
        .state
        .as_deref()
        .map(status_from_state_str)
        .unwrap_or(ContainerStatus::Exited);

    let mut port_bindings = HashMap::new();
    for port in summary.ports.unwrap_or_default() {
        let protocol = match port.typ {
            Some(bollard::models::PortTypeEnum::UDP) => "udp",
            _ => "tcp",
        };
        let Ok(container_port) =
            format!("{}/{protocol}", port.private_port).parse::<ContainerPort>()
        else {
            continue;
        };
        let host_ip = port.ip.unwrap_or_default();
        if let Some(public_port) = port.public_port {
            if is_expected_host_interface(&host_ip) {
                let _ = port_bindings.insert(
                    container_port,
                    HostBinding { host_ip, host_port: public_port },
                );
            }
        }
    }

    let mut network_ips = HashMap::new();
    if let Some(settings) = summary.network_settings {
        for endpoint in settings.networks.unwrap_or_default().into_values() {
            if let (Some(network_id), Some(ip)) =
                (endpoint.network_id, endpoint.ip_address)
            {
                let _ = network_ips.insert(network_id, ip);
            }
        }
    }

    Container {
        id,
        name,
        status,
        labels: summary.labels.unwrap_or_default(),
        port_bindings,
        network_ips,
    }
}

#[async_trait]
impl EngineClient for DockerEngine {
    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            needs_logs_collector: true,
            needs_enclave_data_volume: true,
            // Docker creates enclaves in low single-digit seconds; the pool
            // is not worth running (and networks can't be renamed anyway).
            expensive_enclave_creation: false,
            supports_network_rename: false,
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if Self::is_not_found(&e) => Ok(false),
            Err(e) => Err(EngineError::backend("inspect-image", image, e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        debug!("pulling image '{image}'");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            let _ = step
                .map_err(|e| EngineError::backend("pull-image", image, e))?;
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> =
            HashMap::new();
        let mut port_bindings: PortMap = HashMap::new();
        for (port, publish) in &spec.ports {
            let _ = exposed_ports.insert(port.to_string(), HashMap::new());
            let binding = match publish {
                super::types::PortPublishSpec::NoPublish => continue,
                super::types::PortPublishSpec::AutoPublish => {
                    DockerPortBinding { host_ip: None, host_port: None }
                }
                super::types::PortPublishSpec::ToHostPort(host_port) => {
                    DockerPortBinding {
                        host_ip: None,
                        host_port: Some(host_port.to_string()),
                    }
                }
            };
            let _ =
                port_bindings.insert(port.to_string(), Some(vec![binding]));
        }

        let binds: Vec<String> = spec
            .mounts
            .iter()
            .map(|(source, target)| format!("{source}:{target}"))
            .collect();

        let networking_config = spec.network_id.as_ref().map(|network_id| {
            let ipam_config = spec.static_ip.map(|ip| match ip {
                IpAddr::V4(v4) => EndpointIpamConfig {
                    ipv4_address: Some(v4.to_string()),
                    ..Default::default()
                },
                IpAddr::V6(v6) => EndpointIpamConfig {
                    ipv6_address: Some(v6.to_string()),
                    ..Default::default()
                },
            });
            let endpoint = EndpointSettings {
                ipam_config,
                aliases: spec
                    .network_alias
                    .as_ref()
                    .map(|alias| vec![alias.clone()]),
                ..Default::default()
            };
            NetworkingConfig {
                endpoints_config: HashMap::from([(
                    network_id.clone(),
                    endpoint,
                )]),
            }
        });

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            cmd: spec.cmd.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                binds: Some(binds),
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                EngineError::backend("create-container", &spec.name, e)
            })?;
        debug!(
            "created container '{}' with id '{}' from image '{}'",
            spec.name, response.id, spec.image
        );
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(
                container_id,
                None::<StartContainerOptions<String>>,
            )
            .await
            .map_err(|e| {
                EngineError::backend("start-container", container_id, e)
            })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECONDS };
        self.docker
            .stop_container(container_id, Some(options))
            .await
            .map_err(|e| {
                EngineError::backend("stop-container", container_id, e)
            })
    }

    async fn kill_container(&self, container_id: &str) -> Result<()> {
        let options = KillContainerOptions { signal: "SIGKILL" };
        self.docker
            .kill_container(container_id, Some(options))
            .await
            .map_err(|e| {
                EngineError::backend("kill-container", container_id, e)
            })
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: false,
            link: false,
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| {
                EngineError::backend("remove-container", container_id, e)
            })
    }

    async fn wait_for_exit(&self, container_id: &str) -> Result<()> {
        let options = WaitContainerOptions { condition: "not-running" };
        let mut wait = self.docker.wait_container(container_id, Some(options));
        match wait.next().await {
            // A nonzero exit code surfaces as a wait "error"; the container
            // has still exited, which is all the caller asked about.
            None
            | Some(Ok(_))
            | Some(Err(
                bollard::errors::Error::DockerContainerWaitError { .. },
            )) => Ok(()),
            Some(Err(e)) => {
                Err(EngineError::backend("wait-container", container_id, e))
            }
        }
    }

    async fn inspect_container(
        &self,
        container_id: &str,
    ) -> Result<Container> {
        let response = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| {
                EngineError::backend("inspect-container", container_id, e)
            })?;

        let status =
            status_from_inspect(response.state.and_then(|s| s.status));
        let labels = response
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();

        let (port_bindings, network_ips) = match response.network_settings {
            Some(settings) => {
                let bindings = bindings_from_port_map(settings.ports);
                let mut ips = HashMap::new();
                for endpoint in
                    settings.networks.unwrap_or_default().into_values()
                {
                    if let (Some(network_id), Some(ip)) =
                        (endpoint.network_id, endpoint.ip_address)
                    {
                        let _ = ips.insert(network_id, ip);
                    }
                }
                (bindings, ips)
            }
            None => (HashMap::new(), HashMap::new()),
        };

        Ok(Container {
            id: response.id.unwrap_or_else(|| container_id.to_string()),
            name: response
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            status,
            labels,
            port_bindings,
            network_ips,
        })
    }

    async fn list_containers(
        &self,
        label_filters: &HashMap<String, String>,
        include_stopped: bool,
    ) -> Result<Vec<Container>> {
        let options = ListContainersOptions {
            all: include_stopped,
            filters: label_filters_to_docker(label_filters),
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| {
                EngineError::backend("list-containers", "label filter", e)
            })?;
        Ok(summaries.into_iter().map(container_from_summary).collect())
    }

    async fn connect_container_to_network(
        &self,
        network_id: &str,
        container_id: &str,
        static_ip: Option<IpAddr>,
        alias: Option<&str>,
    ) -> Result<()> {
        let ipam_config = static_ip.map(|ip| match ip {
            IpAddr::V4(v4) => EndpointIpamConfig {
                ipv4_address: Some(v4.to_string()),
                ..Default::default()
            },
            IpAddr::V6(v6) => EndpointIpamConfig {
                ipv6_address: Some(v6.to_string()),
                ..Default::default()
            },
        });
        let options = ConnectNetworkOptions {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings {
                ipam_config,
                aliases: alias.map(|a| vec![a.to_string()]),
                ..Default::default()
            },
        };
        self.docker.connect_network(network_id, options).await.map_err(
            |e| EngineError::backend("connect-network", container_id, e),
        )
    }

    async fn exec_command(
        &self,
        container_id: &str,
        cmd: &[String],
    ) -> Result<ExecOutput> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(cmd.to_vec()),
            ..Default::default()
        };
        let exec =
            self.docker.create_exec(container_id, options).await.map_err(
                |e| EngineError::backend("create-exec", container_id, e),
            )?;

        let mut output = String::new();
        let started =
            self.docker.start_exec(&exec.id, None).await.map_err(|e| {
                EngineError::backend("start-exec", container_id, e)
            })?;
        if let StartExecResults::Attached { output: mut stream, .. } = started
        {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    EngineError::backend("exec-output", container_id, e)
                })?;
                output.push_str(&chunk.to_string());
            }
        }

        let inspected =
            self.docker.inspect_exec(&exec.id).await.map_err(|e| {
                EngineError::backend("inspect-exec", container_id, e)
            })?;
        Ok(ExecOutput {
            exit_code: inspected.exit_code.unwrap_or(0),
            output,
        })
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            check_duplicate: true,
            driver: "bridge".to_string(),
            labels: labels.clone(),
            ..Default::default()
        };
        let response =
            self.docker.create_network(options).await.map_err(|e| {
                EngineError::backend("create-network", name, e)
            })?;
        response.id.ok_or_else(|| {
            EngineError::backend(
                "create-network",
                name,
                anyhow::anyhow!("engine returned no network id"),
            )
        })
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.docker.remove_network(network_id).await.map_err(|e| {
            EngineError::backend("remove-network", network_id, e)
        })
    }

    async fn rename_network(
        &self,
        _network_id: &str,
        _new_name: &str,
    ) -> Result<()> {
        Err(EngineError::Unsupported {
            engine: ENGINE_NAME,
            operation: "rename-network",
        })
    }

    async fn network_exists(&self, network_id: &str) -> Result<bool> {
        match self.docker.inspect_network::<String>(network_id, None).await {
            Ok(_) => Ok(true),
            Err(e) if Self::is_not_found(&e) => Ok(false),
            Err(e) => {
                Err(EngineError::backend("inspect-network", network_id, e))
            }
        }
    }

    async fn list_networks(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Network>> {
        let options = ListNetworksOptions {
            filters: label_filters_to_docker(label_filters),
        };
        let networks =
            self.docker.list_networks(Some(options)).await.map_err(|e| {
                EngineError::backend("list-networks", "label filter", e)
            })?;
        Ok(networks
            .into_iter()
            .map(|network| Network {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_default(),
                labels: network.labels.unwrap_or_default(),
                created: network.created,
            })
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            labels: labels.clone(),
            ..Default::default()
        };
        // Creating a volume with an existing name is a no-op on the engine
        // side; that idempotence is load-bearing for re-entrant setup.
        let _ = self
            .docker
            .create_volume(options)
            .await
            .map_err(|e| EngineError::backend("create-volume", name, e))?;
        Ok(())
    }

    async fn remove_volume(&self, volume_name: &str) -> Result<()> {
        let options = RemoveVolumeOptions { force: true };
        self.docker
            .remove_volume(volume_name, Some(options))
            .await
            .map_err(|e| {
                EngineError::backend("remove-volume", volume_name, e)
            })
    }

    async fn list_volumes(
        &self,
        label_filters: &HashMap<String, String>,
    ) -> Result<Vec<Volume>> {
        let options = ListVolumesOptions {
            filters: label_filters_to_docker(label_filters),
        };
        let response =
            self.docker.list_volumes(Some(options)).await.map_err(|e| {
                EngineError::backend("list-volumes", "label filter", e)
            })?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| Volume {
                name: volume.name,
                labels: volume.labels,
            })
            .collect())
    }
}
