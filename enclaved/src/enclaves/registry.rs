/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! The append-only record of every enclave this process has seen.
//!
//! The registry is a cache, not the source of truth: the engine's labels are.
//! It is rebuilt from label discovery after a restart ([`backfill`]) and only
//! mutated under the manager's mutex.
//!
//! [`backfill`]: HistoricalRegistry::backfill

use std::collections::{HashMap, HashSet};

use super::enclave::EnclaveUuid;
use super::enclave_name::EnclaveName;
use super::error::{EnclaveError, Result};

/// One entry per successful creation; never removed, even after the enclave
/// is destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalIdentifier {
    pub uuid: EnclaveUuid,
    pub name: EnclaveName,
}

impl HistoricalIdentifier {
    pub fn shortened_uuid(&self) -> &str {
        self.uuid.shortened()
    }
}

#[derive(Default)]
pub struct HistoricalRegistry {
    entries: Vec<HistoricalIdentifier>,
    live: HashMap<EnclaveUuid, EnclaveName>,
}

impl HistoricalRegistry {
    pub fn new() -> Self {
        HistoricalRegistry::default()
    }

    /// Records a newly created enclave as live.
    pub fn record(&mut self, uuid: EnclaveUuid, name: EnclaveName) {
        self.entries.push(HistoricalIdentifier {
            uuid: uuid.clone(),
            name: name.clone(),
        });
        let _ = self.live.insert(uuid, name);
    }

    /// The enclave's resources are gone; its history stays.
    pub fn mark_destroyed(&mut self, uuid: &EnclaveUuid) {
        let _ = self.live.remove(uuid);
    }

    /// Seeds the registry from engine discovery. Known uuids are re-marked
    /// live without duplicating their history; uuids discovered live on the
    /// engine but absent here (a previous process created them) get a fresh
    /// entry.
    pub fn backfill<I>(&mut self, discovered: I)
    where
        I: IntoIterator<Item = (EnclaveUuid, EnclaveName)>,
    {
        let known: HashSet<EnclaveUuid> =
            self.entries.iter().map(|entry| entry.uuid.clone()).collect();
        for (uuid, name) in discovered {
            if !known.contains(&uuid) {
                self.entries.push(HistoricalIdentifier {
                    uuid: uuid.clone(),
                    name: name.clone(),
                });
            }
            let _ = self.live.insert(uuid, name);
        }
    }

    pub fn is_name_live(&self, name: &str) -> bool {
        self.live.values().any(|live| live == name)
    }

    pub fn is_live(&self, uuid: &EnclaveUuid) -> bool {
        self.live.contains_key(uuid)
    }

    pub fn live_uuids(&self) -> Vec<EnclaveUuid> {
        self.live.keys().cloned().collect()
    }

    pub fn history(&self) -> &[HistoricalIdentifier] {
        &self.entries
    }

    /// Resolves a user-supplied identifier to exactly one enclave uuid.
    ///
    /// An exact full-uuid match wins outright. Otherwise the identifier may
    /// be a name or a uuid prefix; it must single out exactly one enclave or
    /// the caller gets told to disambiguate.
    pub fn resolve(&self, identifier: &str) -> Result<EnclaveUuid> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.uuid.as_str() == identifier)
        {
            return Ok(entry.uuid.clone());
        }

        let mut matches: Vec<EnclaveUuid> = Vec::new();
        for entry in &self.entries {
            let hit = entry.name == *identifier
                || (!identifier.is_empty()
                    && entry.uuid.as_str().starts_with(identifier));
            if hit && !matches.contains(&entry.uuid) {
                matches.push(entry.uuid.clone());
            }
        }

        match matches.len() {
            0 => Err(EnclaveError::NotFound {
                identifier: identifier.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            count => Err(EnclaveError::AmbiguousIdentifier {
                identifier: identifier.to_string(),
                matches: count,
            }),
        }
    }
}
