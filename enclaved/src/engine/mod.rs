/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Container-engine access.
//!
//! [`EngineClient`] is the raw, engine-specific client contract (Docker via
//! bollard in [`docker`], an in-memory engine in tests). [`EngineAdapter`]
//! layers the safety the rest of the crate relies on: image normalization,
//! the host-port-binding retry loop, local kill-on-failure compensation, and
//! label-filtered bulk operations.

mod adapter;
mod client;
mod docker;
pub mod error;
pub mod labels;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{CreateAndStartOutcome, EngineAdapter};
pub use client::{ContainerSpec, EngineCapabilities, EngineClient};
pub use docker::DockerEngine;
pub use error::{EngineError, Result};
pub use types::{
    Container, ContainerPort, ContainerStatus, ExecOutput, HostBinding,
    Network, PortProtocol, PortPublishSpec, Volume,
};
