/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Process-wide tracing setup. Call [`init`] exactly once at startup, before
//! constructing any component.

use tracing::Level;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error(transparent)]
    TryInitError(#[from] tracing_subscriber::util::TryInitError),
}

/// The program is either "verbose" or it's not.
///
/// Normal mode: Info, Warn, Error
/// Verbose mode: Debug, Trace, Info, Warn, Error
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let tracing_level = if verbose { Level::TRACE } else { Level::INFO };

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::new(format!("enclaved={tracing_level}")))
        .finish()
        .try_init()
        .map_err(|e| e.into())
}
