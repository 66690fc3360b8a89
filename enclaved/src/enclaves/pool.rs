/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Pre-warmed enclaves for engines where creation is slow.
//!
//! A background filler keeps a bounded buffer of anonymous `idle-` enclaves;
//! handing one out is a pop plus a network rename. Only engines that can
//! rename networks and report expensive creation get a pool at all (the
//! manager checks capabilities before constructing one).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::labels::{
    ENCLAVE_NETWORK_NAME_PREFIX, ENCLAVE_UUID_LABEL_KEY,
};
use crate::engine::EngineAdapter;

use super::creator::{CreateEnclaveArgs, EnclaveCreator};
use super::enclave::{Enclave, EnclaveMode};
use super::enclave_name::EnclaveName;
use super::error::{EnclaveError, Result};

pub const IDLE_ENCLAVE_NAME_PREFIX: &str = "idle-";

const GET_ENCLAVE_TIMEOUT: Duration = Duration::from_secs(30);
const TIME_BETWEEN_FILL_RETRIES: Duration = Duration::from_secs(2);

pub struct EnclavePool {
    adapter: EngineAdapter,
    idle: Mutex<mpsc::Receiver<Enclave>>,
    filler: JoinHandle<()>,
}

impl EnclavePool {
    /// Starts a pool only when it pays off: the engine must report expensive
    /// enclave creation, and handing out a pooled enclave requires network
    /// renames. Engines with cheap creation get `None` and create directly.
    pub async fn start_if_supported(
        adapter: EngineAdapter,
        creator: Arc<EnclaveCreator>,
        capacity: usize,
    ) -> Result<Option<Self>> {
        let capabilities = adapter.capabilities();
        if capacity < 2
            || !capabilities.expensive_enclave_creation
            || !capabilities.supports_network_rename
        {
            return Ok(None);
        }
        Ok(Some(Self::start(adapter, creator, capacity).await?))
    }

    /// Sweeps idle leftovers from previous runs, then starts the filler.
    /// Capacity N keeps N-1 enclaves buffered plus one creation in flight.
    pub async fn start(
        adapter: EngineAdapter,
        creator: Arc<EnclaveCreator>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity < 2 {
            return Err(EnclaveError::Pool {
                reason: "pool capacity must be at least 2".to_string(),
            });
        }

        Self::sweep_leftover_idle_enclaves(&adapter).await?;

        let (tx, rx) = mpsc::channel(capacity - 1);
        let filler = tokio::spawn(Self::fill(creator, tx));
        info!("enclave pool started with capacity {capacity}");
        Ok(EnclavePool { adapter, idle: Mutex::new(rx), filler })
    }

    /// Idle enclaves from a previous process are unusable (their queue died
    /// with the process), so they are destroyed rather than adopted.
    async fn sweep_leftover_idle_enclaves(
        adapter: &EngineAdapter,
    ) -> Result<()> {
        let idle_network_prefix =
            format!("{ENCLAVE_NETWORK_NAME_PREFIX}{IDLE_ENCLAVE_NAME_PREFIX}");
        let networks =
            adapter.list_enclave_networks().await.map_err(|err| {
                EnclaveError::Pool {
                    reason: format!("startup sweep failed: {err}"),
                }
            })?;
        for network in networks {
            if !network.name.starts_with(&idle_network_prefix) {
                continue;
            }
            let Some(uuid) = network.labels.get(ENCLAVE_UUID_LABEL_KEY)
            else {
                warn!(
                    "idle network '{}' carries no enclave uuid label, skipping",
                    network.name
                );
                continue;
            };
            info!("destroying leftover idle enclave '{uuid}'");
            if let Err(err) = adapter.destroy_enclave_resources(uuid).await {
                warn!("could not destroy leftover idle enclave '{uuid}': {err}");
            }
        }
        Ok(())
    }

    async fn fill(creator: Arc<EnclaveCreator>, tx: mpsc::Sender<Enclave>) {
        loop {
            let Ok(name) = EnclaveName::new(format!(
                "{IDLE_ENCLAVE_NAME_PREFIX}{}",
                &Uuid::new_v4().simple().to_string()[..12]
            )) else {
                continue;
            };
            let args = CreateEnclaveArgs {
                name,
                mode: EnclaveMode::Test,
                log_level: "info".to_string(),
                debug_mode: false,
                control_version_tag: None,
            };
            match creator.create_enclave(&args).await {
                Ok(enclave) => {
                    debug!(
                        "pooled idle enclave '{}'",
                        enclave.uuid.shortened()
                    );
                    // Blocks while the buffer is full; errors once the pool
                    // is dropped, which is the shutdown signal.
                    if tx.send(enclave).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("pool filler could not create an enclave: {err}");
                    tokio::time::sleep(TIME_BETWEEN_FILL_RETRIES).await;
                }
            }
        }
        debug!("pool filler exiting");
    }

    /// Pops an idle enclave and renames its network to the caller's name.
    /// Bounded wait; callers treat failure as "create directly instead".
    pub async fn get_enclave(&self, name: &EnclaveName) -> Result<Enclave> {
        let enclave = {
            let mut idle = self.idle.lock().await;
            match tokio::time::timeout(GET_ENCLAVE_TIMEOUT, idle.recv()).await
            {
                Ok(Some(enclave)) => enclave,
                Ok(None) => {
                    return Err(EnclaveError::Pool {
                        reason: "pool is shut down".to_string(),
                    });
                }
                Err(_) => {
                    return Err(EnclaveError::Pool {
                        reason: format!(
                            "no pre-warmed enclave became available within {}s",
                            GET_ENCLAVE_TIMEOUT.as_secs()
                        ),
                    });
                }
            }
        };

        let network = self
            .adapter
            .enclave_network(enclave.uuid.as_str())
            .await
            .map_err(|err| EnclaveError::backend(enclave.uuid.as_str(), err))?;
        let new_network_name = format!("{ENCLAVE_NETWORK_NAME_PREFIX}{name}");
        if let Err(err) = self
            .adapter
            .client()
            .rename_network(&network.id, &new_network_name)
            .await
        {
            // The popped enclave stays idle-named and orphaned until the
            // next startup sweep picks it up.
            warn!(
                "could not rename pooled enclave '{}', it will be swept later",
                enclave.uuid.shortened()
            );
            return Err(EnclaveError::backend(enclave.uuid.as_str(), err));
        }
        info!(
            "handing out pooled enclave '{}' as '{name}'",
            enclave.uuid.shortened()
        );
        Ok(Enclave { name: name.clone(), ..enclave })
    }

    /// Closes the buffer and waits for the filler to notice. An in-flight
    /// creation is not cancelled; it completes, fails to enqueue, and the
    /// filler exits.
    pub async fn shutdown(self) {
        drop(self.idle);
        let _ = self.filler.await;
    }
}
