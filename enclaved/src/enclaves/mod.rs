/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Enclave lifecycle: creation saga, mutex-serialized manager, historical
//! identifier registry, and the warm pool.

pub mod collaborators;
mod creator;
mod enclave;
mod enclave_name;
pub mod error;
mod manager;
mod name_generator;
mod pool;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use creator::{CreateEnclaveArgs, EnclaveCreator};
pub use enclave::{
    ControlContainerInfo, Enclave, EnclaveMode, EnclaveStatus, EnclaveUuid,
};
pub use enclave_name::{EnclaveName, MAX_ENCLAVE_NAME_LENGTH};
pub use error::{EnclaveError, Result};
pub use manager::{CreateEnclaveOptions, EnclaveManager, RemovedEnclave};
pub use name_generator::{NameGenerator, NatureThemedNameGenerator};
pub use pool::{EnclavePool, IDLE_ENCLAVE_NAME_PREFIX};
pub use registry::{HistoricalIdentifier, HistoricalRegistry};
