use prometheus_client::{metrics::counter::Counter, registry::Registry};

#[derive(Clone, Debug, Default)]
pub struct AggregatorMetrics {
    pub(crate) emitted: Counter,
    pub(crate) duplicates: Counter,
    pub(crate) not_ready: Counter,
    pub(crate) watcher_errors: Counter,
}

impl AggregatorMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let emitted = Counter::default();
        reg.register(
            "snapshots_emitted",
            "Count of snapshots forwarded for translation",
            emitted.clone(),
        );

        let duplicates = Counter::default();
        reg.register(
            "snapshots_duplicate",
            "Count of snapshots suppressed because their content was unchanged",
            duplicates.clone(),
        );

        let not_ready = Counter::default();
        reg.register(
            "snapshots_not_ready",
            "Count of snapshots suppressed because a required input had not been observed",
            not_ready.clone(),
        );

        let watcher_errors = Counter::default();
        reg.register(
            "watcher_errors",
            "Count of errors reported by storage watchers",
            watcher_errors.clone(),
        );

        Self {
            emitted,
            duplicates,
            not_ready,
            watcher_errors,
        }
    }
}
