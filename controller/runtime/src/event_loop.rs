use ahash::AHashSet as HashSet;
use meridian_controller_snapshot::Snapshot;
use meridian_controller_status::SharedIndex;
use meridian_controller_storage::Error;
use meridian_controller_translator::{resolve_roles, RoleDefaults, Translator};
use meridian_controller_xds::ResourceCache;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{exponential_buckets, Histogram},
    },
    registry::Registry,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, info, instrument, trace, warn};

/// Translates every role in the latest snapshot, installs the roles that
/// translated cleanly, and hands all reports to the status index.
///
/// A pass runs whenever a new snapshot is published and on every resync tick.
/// Input errors are logged; the cache keeps serving what it has.
pub struct EventLoop {
    translator: Translator,
    role_defaults: RoleDefaults,
    cache: ResourceCache,
    status: SharedIndex,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    errors: mpsc::Receiver<Error>,
    resync: Duration,
    ready: watch::Sender<bool>,
    metrics: EventLoopMetrics,
}

#[derive(Clone, Debug)]
pub struct EventLoopMetrics {
    passes: Counter,
    input_errors: Counter,
    role_errors: Family<RoleLabels, Counter>,
    duration: Histogram,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RoleLabels {
    role: String,
}

// === impl EventLoop ===

impl EventLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        translator: Translator,
        role_defaults: RoleDefaults,
        cache: ResourceCache,
        status: SharedIndex,
        snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
        errors: mpsc::Receiver<Error>,
        resync: Duration,
        metrics: EventLoopMetrics,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            translator,
            role_defaults,
            cache,
            status,
            snapshots,
            errors,
            resync,
            ready,
            metrics,
        }
    }

    /// Becomes true once the first pass has completed.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub async fn run(mut self, drain: drain::Watch) {
        let mut resync = time::interval(self.resync);
        resync.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        resync.tick().await;

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        // A snapshot may have been published before we started.
        self.snapshots.mark_changed();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Shutting down");
                    return;
                }

                Some(error) = self.errors.recv() => {
                    warn!(%error, "Input error; serving last known configuration");
                    self.metrics.input_errors.inc();
                    continue;
                }

                res = self.snapshots.changed() => {
                    if res.is_err() {
                        debug!("Snapshot watch closed");
                        return;
                    }
                }

                _ = resync.tick() => {
                    trace!("Resync");
                }
            }

            let snapshot = self.snapshots.borrow_and_update().clone();
            match snapshot {
                Some(snapshot) => self.sync(&snapshot),
                None => trace!("No snapshot yet"),
            }
        }
    }

    #[instrument(skip_all, fields(snapshot = snapshot.hash()))]
    pub(crate) fn sync(&self, snapshot: &Snapshot) {
        let start = time::Instant::now();

        let roles = resolve_roles(snapshot.config(), &self.role_defaults);
        for role in &roles {
            let (bundle, reports) = self.translator.translate(role, snapshot);

            let failed = reports.iter().filter(|r| r.is_err()).count();
            if failed == 0 {
                self.cache.set_snapshot(&role.name, bundle);
            } else {
                warn!(
                    role = %role.name,
                    objects = failed,
                    "Translation produced errors; keeping the role's previous configuration"
                );
                self.metrics
                    .role_errors
                    .get_or_create(&RoleLabels {
                        role: role.name.clone(),
                    })
                    .inc();
            }

            self.status.write().apply_reports(&role.name, reports);
        }

        let names = roles.iter().map(|r| r.name.as_str()).collect::<HashSet<_>>();
        self.cache.retain(|role| names.contains(role));
        self.status.write().retain_roles(|role| names.contains(role));

        self.metrics.passes.inc();
        self.metrics
            .duration
            .observe(start.elapsed().as_secs_f64());
        if !*self.ready.borrow() {
            info!(roles = roles.len(), "First pass complete");
            self.ready.send_replace(true);
        }
    }
}

// === impl EventLoopMetrics ===

impl EventLoopMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let passes = Counter::default();
        reg.register(
            "passes",
            "Count of translation passes over a snapshot",
            passes.clone(),
        );

        let input_errors = Counter::default();
        reg.register(
            "input_errors",
            "Count of errors reported by configuration, secret, file, and endpoint watchers",
            input_errors.clone(),
        );

        let role_errors = Family::default();
        reg.register(
            "role_errors",
            "Count of passes in which a role was not installed because of errors",
            role_errors.clone(),
        );

        let duration = Histogram::new(exponential_buckets(0.0005, 2.0, 12));
        reg.register(
            "duration_seconds",
            "Time taken to translate every role in a snapshot",
            duration.clone(),
        );

        Self {
            passes,
            input_errors,
            role_errors,
            duration,
        }
    }
}

impl Default for EventLoopMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

#[cfg(test)]
mod tests;
