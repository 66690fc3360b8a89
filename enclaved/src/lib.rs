/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! # enclaved
//!
//! Reliable, concurrency-safe orchestration of *enclaves*, isolated
//! sandboxes each composed of a dedicated network, an API/control container,
//! and a log-shipping sidecar, on top of a container engine that offers no
//! transactions and is only eventually consistent.
//!
//! The crate is organized leaves-first:
//!
//! - [`engine`] wraps a raw container-engine client ([`engine::EngineClient`])
//!   into idempotent, retry-safe primitives ([`engine::EngineAdapter`]).
//! - [`tasks`] bounds concurrency when one operation is applied to many
//!   engine objects at once.
//! - [`enclaves`] holds the enclave model, the all-or-nothing creation saga,
//!   the mutex-serialized manager façade, and the pre-warmed pool.
//!
//! Every engine object created for an enclave carries the label set from
//! [`engine::labels`]; label completeness is the invariant the whole manager
//! depends on, because labels are the *only* way to rediscover an enclave's
//! resources after a process restart.

pub mod enclaves;
pub mod engine;
pub mod logging;
pub mod tasks;

pub use enclaves::{
    Enclave, EnclaveManager, EnclaveMode, EnclaveName, EnclaveStatus,
    EnclaveUuid,
};
pub use engine::{EngineAdapter, EngineClient};
pub use tasks::TaskRunner;
