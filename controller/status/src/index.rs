use crate::metrics::{ControllerMetrics, IndexMetrics};
use ahash::AHashMap as HashMap;
use meridian_controller_core::{Errors, Report, ResourceRef, Status, StatusState};
use meridian_controller_storage::ConfigStore;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time,
};
use tracing::{debug, error, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Writes status updates to the config store.
pub struct Controller<S> {
    store: Arc<S>,
    index: SharedIndex,
    updates: UnboundedReceiver<Update>,
    timeout: Duration,
    metrics: ControllerMetrics,
}

/// Tracks the reports each role produced for each configuration object and
/// the status last sent for it.
pub struct Index {
    updates: UnboundedSender<Update>,

    /// Errors reported against an object, keyed by the reporting role.
    reports: HashMap<ResourceRef, BTreeMap<String, Errors>>,
    statuses: HashMap<ResourceRef, Status>,

    metrics: IndexMetrics,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub id: ResourceRef,
    pub status: Status,
}

// === impl Controller ===

impl<S: ConfigStore> Controller<S> {
    pub fn new(
        store: Arc<S>,
        index: SharedIndex,
        updates: UnboundedReceiver<Update>,
        timeout: Duration,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            store,
            index,
            updates,
            timeout,
            metrics,
        }
    }

    /// Writes updates until every sender is dropped.
    ///
    /// A failed or timed-out write is forgotten by the index so the next
    /// identical report is sent again.
    pub async fn process_updates(mut self) {
        while let Some(Update { id, status }) = self.updates.recv().await {
            match time::timeout(self.timeout, self.store.write_status(&id, &status)).await {
                Ok(Ok(())) => {
                    debug!(%id, state = ?status.state, "Wrote status");
                    self.metrics.patch_succeeded.inc();
                    continue;
                }
                Ok(Err(error)) => {
                    error!(%id, %error, "Failed to write status");
                    self.metrics.patch_failed.inc();
                }
                Err(_) => {
                    warn!(%id, timeout = ?self.timeout, "Timed out writing status");
                    self.metrics.patch_timeout.inc();
                }
            }
            self.index.write().forget(&id, &status);
        }
    }
}

// === impl Index ===

impl Index {
    pub fn shared(updates: UnboundedSender<Update>, metrics: IndexMetrics) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            updates,
            reports: HashMap::new(),
            statuses: HashMap::new(),
            metrics,
        }))
    }

    /// Replaces everything `role` previously reported with `reports`.
    ///
    /// Objects that `role` no longer reports on keep the reports of other
    /// roles; objects no role reports on are dropped without an update.
    pub fn apply_reports(&mut self, role: &str, reports: impl IntoIterator<Item = Report>) {
        let mut touched = BTreeSet::new();
        for (id, by_role) in self.reports.iter_mut() {
            if by_role.remove(role).is_some() {
                touched.insert(id.clone());
            }
        }

        for Report { resource, errors } in reports {
            touched.insert(resource.clone());
            self.reports
                .entry(resource)
                .or_default()
                .insert(role.to_string(), errors);
        }

        self.reconcile(touched);
    }

    /// Discards the reports of every role for which `keep` returns false.
    pub fn retain_roles(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let mut touched = BTreeSet::new();
        for (id, by_role) in self.reports.iter_mut() {
            let before = by_role.len();
            by_role.retain(|role, _| keep(role.as_str()));
            if by_role.len() != before {
                touched.insert(id.clone());
            }
        }
        self.reconcile(touched);
    }

    pub fn status(&self, id: &ResourceRef) -> Option<&Status> {
        self.statuses.get(id)
    }

    fn reconcile(&mut self, touched: BTreeSet<ResourceRef>) {
        self.reports.retain(|_, by_role| !by_role.is_empty());

        for id in touched {
            let Some(by_role) = self.reports.get(&id) else {
                self.statuses.remove(&id);
                continue;
            };
            let status = merge(by_role);
            if !self.update_status(id.clone(), status.clone()) {
                self.metrics.unchanged.inc();
                continue;
            }

            self.metrics.updates.inc();
            if let Err(error) = self.updates.send(Update { id, status }) {
                error!(%error, "Failed to queue status update");
            }
        }

        let rejected = self
            .statuses
            .values()
            .filter(|s| s.state == StatusState::Rejected)
            .count();
        self.metrics.rejected.set(rejected as i64);
    }

    // If the status is new or differs from the last one sent, return true so
    // that an update is generated; otherwise return false.
    fn update_status(&mut self, id: ResourceRef, status: Status) -> bool {
        if self.statuses.get(&id) == Some(&status) {
            return false;
        }
        self.statuses.insert(id, status);
        true
    }

    fn forget(&mut self, id: &ResourceRef, status: &Status) {
        if self.statuses.get(id) == Some(status) {
            self.statuses.remove(id);
        }
    }
}

/// An object is accepted only if no role reported an error against it.
fn merge(by_role: &BTreeMap<String, Errors>) -> Status {
    let reasons = by_role
        .iter()
        .filter(|(_, errors)| !errors.is_empty())
        .map(|(role, errors)| format!("{role}: {errors}"))
        .collect::<Vec<_>>();
    if reasons.is_empty() {
        return Status::accepted();
    }
    Status::rejected(reasons.join("\n"))
}
