/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use crate::engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnclaveError>;

#[derive(Error, Debug)]
pub enum EnclaveError {
    /// Rejected before any engine call.
    #[error("invalid enclave name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Rejected before any engine call; names are unique among live enclaves.
    #[error("enclave name '{name}' is already taken by a live enclave")]
    NameTaken { name: String },

    #[error("no enclave matches identifier '{identifier}'")]
    NotFound { identifier: String },

    #[error(
        "identifier '{identifier}' matches {matches} enclaves; \
         use a longer uuid prefix or the full uuid"
    )]
    AmbiguousIdentifier { identifier: String, matches: usize },

    /// An engine operation failed on the forward path. Compensation, if any,
    /// completed cleanly; no labeled resources remain.
    #[error("engine failure for enclave '{enclave}': {source}")]
    Backend {
        enclave: String,
        #[source]
        source: EngineError,
    },

    /// A collaborator (logs collector, control container launcher) failed on
    /// the forward path.
    #[error("step '{step}' failed for enclave '{enclave}': {source}")]
    Collaborator {
        step: &'static str,
        enclave: String,
        source: anyhow::Error,
    },

    /// Rollback itself failed, leaving orphaned resources. Never retried;
    /// the message names the exact label to clean up manually.
    #[error(
        "ACTION REQUIRED: rollback for enclave '{enclave_uuid}' failed; \
         manually remove engine resources labeled with enclave uuid \
         '{enclave_uuid}':\n{details}"
    )]
    PartialFailure { enclave_uuid: String, details: String },

    /// The warm pool could not supply an enclave. Callers fall back to
    /// direct creation.
    #[error("warm pool could not supply an enclave: {reason}")]
    Pool { reason: String },

    /// One or more enclaves failed in a bulk operation; lists every failing
    /// enclave, never just the first.
    #[error("'{operation}' failed for {count} enclaves:\n{details}")]
    Bulk { operation: &'static str, count: usize, details: String },
}

impl EnclaveError {
    pub fn backend(enclave: impl Into<String>, source: EngineError) -> Self {
        EnclaveError::Backend { enclave: enclave.into(), source }
    }
}
