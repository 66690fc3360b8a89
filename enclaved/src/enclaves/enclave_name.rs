/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use fancy_regex::Regex;
use lazy_static::lazy_static;
use std::fmt::{Display, Formatter};

use super::error::{EnclaveError, Result};

pub const MAX_ENCLAVE_NAME_LENGTH: usize = 60;

lazy_static! {
    static ref ALLOWED_ENCLAVE_NAME_PATTERN: Regex =
        Regex::new(r"^[-A-Za-z0-9]{1,60}$")
            .expect("enclave name pattern is a valid regex");
}

/// A validated enclave name. Names also become engine network names, so the
/// allowed alphabet is the intersection of what every engine accepts.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct EnclaveName(String);

impl EnclaveName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(EnclaveError::InvalidName {
                name,
                reason: "name must not be empty",
            });
        }
        let matched = ALLOWED_ENCLAVE_NAME_PATTERN
            .is_match(&name)
            .unwrap_or(false);
        if !matched {
            return Err(EnclaveError::InvalidName {
                name,
                reason: "allowed are up to 60 letters, digits and dashes",
            });
        }
        Ok(EnclaveName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for EnclaveName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for EnclaveName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EnclaveName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
