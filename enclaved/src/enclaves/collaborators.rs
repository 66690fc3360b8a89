/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Seams to the components the core treats as opaque: the log-shipping
//! sidecar, the control-container launcher, and local log artifact storage.
//! Implementations live outside this crate; the core only calls these traits
//! and wraps their failures.

use async_trait::async_trait;

use crate::engine::ContainerPort;

use super::enclave::EnclaveUuid;

/// Identifies a running logs-collector sidecar so it can be health-checked
/// and destroyed later.
#[derive(Debug, Clone)]
pub struct LogsCollectorHandle {
    pub container_id: String,
}

#[async_trait]
pub trait LogsCollector: Send + Sync {
    /// Creates and starts the sidecar on the enclave's network. The sidecar
    /// is not necessarily healthy when this returns; callers poll
    /// [`check_health`](Self::check_health).
    async fn create_and_start(
        &self,
        enclave_uuid: &EnclaveUuid,
        network_id: &str,
    ) -> anyhow::Result<LogsCollectorHandle>;

    /// Succeeds once the sidecar's health endpoint answers.
    async fn check_health(
        &self,
        handle: &LogsCollectorHandle,
    ) -> anyhow::Result<()>;

    async fn destroy(&self, handle: &LogsCollectorHandle)
        -> anyhow::Result<()>;
}

/// What the launcher reports about a started control container. Only these
/// addresses matter to the core.
#[derive(Debug, Clone)]
pub struct ControlContainer {
    pub container_id: String,
    pub private_ip: String,
    pub private_port: ContainerPort,
    pub public_ip: Option<String>,
    pub public_port: Option<u16>,
    pub bridge_ip: Option<String>,
}

/// Everything a launcher needs besides the image version.
#[derive(Debug, Clone)]
pub struct LaunchArgs {
    pub enclave_uuid: EnclaveUuid,
    pub network_id: String,
    pub log_level: String,
    pub debug_mode: bool,
    pub production: bool,
}

#[async_trait]
pub trait ControlContainerLauncher: Send + Sync {
    async fn launch_with_default_version(
        &self,
        args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer>;

    async fn launch_with_custom_version(
        &self,
        version_tag: &str,
        args: &LaunchArgs,
    ) -> anyhow::Result<ControlContainer>;
}

/// Removes an enclave's locally stored log artifacts after destruction.
#[async_trait]
pub trait LogArtifactRemover: Send + Sync {
    async fn remove(&self, enclave_uuid: &EnclaveUuid) -> anyhow::Result<()>;
}
