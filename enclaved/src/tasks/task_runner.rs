/* -------------------------------------------------------------------------- *\
 *                                 enclaved                                   *
 *                    Sandbox Enclave Orchestration Runtime                   *
 * -------------------------------------------------------------------------- *
 * Copyright 2024 - 2026, the enclaved contributors                           *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Outcome of a [`TaskRunner::run`] batch. Every input key lands in exactly
/// one of the two sides.
pub struct TaskResults<K> {
    pub succeeded: HashSet<K>,
    pub failed: HashMap<K, anyhow::Error>,
}

impl<K> TaskResults<K> {
    pub fn is_all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<K: Display> TaskResults<K> {
    /// One line per failed key, for folding into an aggregate error message.
    pub fn failure_details(&self) -> String {
        let mut lines: Vec<String> = self
            .failed
            .iter()
            .map(|(key, err)| format!("{key}: {err:#}"))
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

impl<K> Default for TaskResults<K> {
    fn default() -> Self {
        TaskResults { succeeded: HashSet::new(), failed: HashMap::new() }
    }
}

/// Runs one async operation per key across a fixed-size worker pool.
///
/// Workers pull keys off a shared queue, so a slow key never holds up more
/// than one worker. Individual failures are collected, never short-circuited;
/// the caller decides what a partially failed batch means.
#[derive(Clone)]
pub struct TaskRunner {
    parallelism: usize,
}

impl TaskRunner {
    pub const DEFAULT_PARALLELISM: usize = 25;

    pub fn new(parallelism: usize) -> Self {
        TaskRunner { parallelism: parallelism.max(1) }
    }

    pub async fn run<K, F, Fut>(
        &self,
        keys: Vec<K>,
        operation: F,
    ) -> TaskResults<K>
    where
        K: Clone + Eq + Hash + Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let total = keys.len();
        if total == 0 {
            return TaskResults::default();
        }

        // Both channels are sized to the input, so neither the preload below
        // nor a worker reporting a result can ever block on capacity.
        let (work_tx, work_rx) = mpsc::channel(total);
        for key in keys {
            if work_tx.send(key).await.is_err() {
                break;
            }
        }
        drop(work_tx);

        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel(total);
        let operation = Arc::new(operation);

        let worker_count = self.parallelism.min(total);
        trace!("running {total} tasks across {worker_count} workers");
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let operation = Arc::clone(&operation);
            workers.push(tokio::spawn(async move {
                loop {
                    let key = { work_rx.lock().await.recv().await };
                    let Some(key) = key else {
                        break;
                    };
                    let outcome = operation(key.clone()).await;
                    if result_tx.send((key, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let _ = futures::future::join_all(workers).await;

        let mut results = TaskResults::default();
        while let Some((key, outcome)) = result_rx.recv().await {
            match outcome {
                Ok(()) => {
                    let _ = results.succeeded.insert(key);
                }
                Err(err) => {
                    let _ = results.failed.insert(key, err);
                }
            }
        }
        results
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        TaskRunner::new(Self::DEFAULT_PARALLELISM)
    }
}
