/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Random names for enclaves the caller didn't bother naming. Constructed
//! once at startup and injected; never a lazy global.

use rand::seq::SliceRandom;

/// Seam for tests: the manager only ever sees this trait.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "bold", "brave", "calm", "crimson", "curious",
    "dusty", "eager", "fierce", "gentle", "hidden", "humble", "icy",
    "jolly", "keen", "lively", "lucky", "mellow", "misty", "noble",
    "patient", "quiet", "rapid", "rustic", "silent", "solar", "steady",
    "swift", "tidal", "vivid", "wild",
];

const NOUNS: &[&str] = &[
    "aspen", "badger", "basin", "birch", "brook", "canyon", "cedar",
    "comet", "condor", "coral", "crater", "delta", "dune", "falcon",
    "fjord", "geyser", "glacier", "grove", "heron", "lagoon", "lynx",
    "marmot", "meadow", "mesa", "osprey", "otter", "pine", "raven",
    "reef", "sequoia", "tundra", "willow",
];

/// Produces names like `misty-fjord`. Collisions against live enclaves are
/// the manager's problem; this type only samples.
pub struct NatureThemedNameGenerator;

impl NameGenerator for NatureThemedNameGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective =
            ADJECTIVES.choose(&mut rng).unwrap_or(&ADJECTIVES[0]);
        let noun = NOUNS.choose(&mut rng).unwrap_or(&NOUNS[0]);
        format!("{adjective}-{noun}")
    }
}
