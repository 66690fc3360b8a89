/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A raw engine-client call failed. Always carries the operation and the
    /// object it was aimed at, so the failure is diagnosable without a trace.
    #[error("engine call '{operation}' on '{object}' failed: {source}")]
    Backend { operation: &'static str, object: String, source: anyhow::Error },

    /// The caller asked for a container on a network that was never created.
    /// This is a programmer error, not a transient engine fault.
    #[error(
        "cannot create container '{container}': network '{network}' was never created"
    )]
    NetworkNeverCreated { container: String, network: String },

    /// Published ports never became visible within the retry budget.
    #[error(
        "container '{container}' got host bindings for only {bound} of {expected} \
         published ports after {attempts} checks"
    )]
    PortBindingTimeout {
        container: String,
        bound: usize,
        expected: usize,
        attempts: u32,
    },

    /// A label query for a singleton resource returned more than one match.
    /// The label scheme guarantees uniqueness, so this is an invariant
    /// violation, not a valid state.
    #[error("expected exactly one {what} matching '{filter}', found {matches}")]
    SingletonViolation { what: &'static str, filter: String, matches: usize },

    #[error("no {what} matching '{filter}' exists")]
    NotFound { what: &'static str, filter: String },

    #[error("engine '{engine}' does not support '{operation}'")]
    Unsupported { engine: &'static str, operation: &'static str },

    #[error("malformed port '{input}', expected '<number>/tcp' or '<number>/udp'")]
    MalformedPort { input: String },

    /// One or more objects failed in a bulk operation. Never fails fast: the
    /// details list every failing object, not just the first.
    #[error("engine bulk operation '{operation}' failed for {count} objects:\n{details}")]
    PartialBatch { operation: &'static str, count: usize, details: String },
}

impl EngineError {
    pub fn backend(
        operation: &'static str,
        object: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        EngineError::Backend {
            operation,
            object: object.into(),
            source: source.into(),
        }
    }
}
