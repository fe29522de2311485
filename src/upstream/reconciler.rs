//! Pool membership synchronizer.
//!
//! # Responsibilities
//! - Compare discovered pool members with the keys stored for each pool
//! - Issue one Put per new member and one Delete per departed member
//! - Keep going through every pool even when some operations fail
//!
//! # Health
//! ```text
//! any attempt fails         → Retrying
//! an operation gives up     → Failed (stays Failed for the rest of the pass)
//! whole pass succeeded      → Up
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::health::{HealthFlag, HealthState};
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryError, RetryPolicy};
use crate::routing::Pool;
use crate::upstream::store::{pool_dir, KvError, KvStore};

/// Minimal change set for one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl PoolDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `added = discovered − stored`, `removed = stored − discovered`.
pub fn diff(stored: &BTreeSet<String>, discovered: &BTreeSet<String>) -> PoolDiff {
    PoolDiff {
        added: discovered.difference(stored).cloned().collect(),
        removed: stored.difference(discovered).cloned().collect(),
    }
}

/// An operation that exhausted its retries.
#[derive(Debug)]
pub struct OperationFailure {
    pub kind: &'static str,
    pub key: String,
    pub error: KvError,
}

/// Outcome of one synchronization pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub pools: usize,
    pub added: usize,
    pub removed: usize,
    pub failures: Vec<OperationFailure>,
    pub cancelled: bool,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

enum OpOutcome<T> {
    Done(T),
    GaveUp,
    Cancelled,
}

/// Drives the store toward discovered pool membership.
pub struct UpstreamReconciler<S> {
    store: S,
    prefix: String,
    policy: RetryPolicy,
    health: HealthFlag,
}

impl<S: KvStore> UpstreamReconciler<S> {
    pub fn new(store: S, prefix: impl Into<String>, policy: RetryPolicy, health: HealthFlag) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            policy,
            health,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Synchronize every pool of one snapshot.
    ///
    /// Pools missing from `pools` are left untouched in the store.
    pub async fn reconcile(
        &self,
        pools: &BTreeMap<String, Pool>,
        shutdown: &mut ShutdownListener,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (name, pool) in pools {
            report.pools += 1;
            let dir = pool_dir(&self.prefix, name);

            let stored = match self
                .with_retry("list", &dir, &mut report, shutdown, |store, key| store.list_keys(key))
                .await
            {
                OpOutcome::Done(keys) => stored_members(&dir, keys),
                OpOutcome::GaveUp => continue,
                OpOutcome::Cancelled => return report,
            };

            let discovered: BTreeSet<String> = pool.endpoints.iter().map(ToString::to_string).collect();
            let changes = diff(&stored, &discovered);
            if changes.is_empty() {
                tracing::trace!(pool = %name, members = discovered.len(), "Pool already in sync");
                continue;
            }
            tracing::info!(
                pool = %name,
                added = ?changes.added,
                removed = ?changes.removed,
                "Syncing pool membership"
            );

            for member in &changes.added {
                let key = format!("{}{}", dir, member);
                match self.with_retry("put", &key, &mut report, shutdown, |store, key| store.put(key)).await {
                    OpOutcome::Done(()) => report.added += 1,
                    OpOutcome::GaveUp => {}
                    OpOutcome::Cancelled => return report,
                }
            }

            for member in &changes.removed {
                let key = format!("{}{}", dir, member);
                match self.with_retry("delete", &key, &mut report, shutdown, |store, key| store.delete(key)).await {
                    OpOutcome::Done(()) => report.removed += 1,
                    OpOutcome::GaveUp => {}
                    OpOutcome::Cancelled => return report,
                }
            }
        }

        if report.failures.is_empty() {
            self.health.set(HealthState::Up);
        } else {
            self.health.set(HealthState::Failed);
            tracing::error!(failures = report.failures.len(), "Pool sync finished with failed operations");
        }
        report
    }

    async fn with_retry<'s, T, F>(
        &'s self,
        kind: &'static str,
        key: &'s str,
        report: &mut ReconcileReport,
        shutdown: &mut ShutdownListener,
        op: F,
    ) -> OpOutcome<T>
    where
        F: Fn(&'s S, &'s str) -> futures_util::future::BoxFuture<'s, Result<T, KvError>>,
    {
        let store = &self.store;
        let health = &self.health;
        let result = retry_with_backoff(
            &self.policy,
            shutdown,
            |attempt, err: &KvError| {
                metrics::record_store_operation(kind, false);
                // Failed is sticky for the rest of the pass.
                if health.get() != HealthState::Failed {
                    health.set(HealthState::Retrying);
                }
                tracing::warn!(op = kind, key = %key, attempt, error = %err, "Store operation failed");
            },
            || op(store, key),
        )
        .await;

        match result {
            Ok(value) => {
                metrics::record_store_operation(kind, true);
                OpOutcome::Done(value)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!(op = kind, key = %key, attempts, error = %last, "Store operation gave up");
                self.health.set(HealthState::Failed);
                report.failures.push(OperationFailure {
                    kind,
                    key: key.to_string(),
                    error: last,
                });
                OpOutcome::GaveUp
            }
            Err(RetryError::Cancelled { .. }) => {
                report.cancelled = true;
                OpOutcome::Cancelled
            }
        }
    }
}

/// Member names stored under `dir`, ignoring the directory key itself and
/// anything nested deeper.
fn stored_members(dir: &str, keys: Vec<String>) -> BTreeSet<String> {
    keys.into_iter()
        .filter_map(|key| {
            let member = key.strip_prefix(dir)?;
            (!member.is_empty() && !member.contains('/')).then(|| member.to_string())
        })
        .collect()
}
