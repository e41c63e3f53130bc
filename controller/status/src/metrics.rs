use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    pub(crate) updates: Counter,
    pub(crate) unchanged: Counter,
    pub(crate) rejected: Gauge,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    pub(crate) patch_succeeded: Counter,
    pub(crate) patch_failed: Counter,
    pub(crate) patch_timeout: Counter,
}

impl IndexMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let updates = Counter::default();
        reg.register(
            "updates",
            "Count of status updates queued for writing",
            updates.clone(),
        );

        let unchanged = Counter::default();
        reg.register(
            "unchanged",
            "Count of merged statuses that matched the last written status",
            unchanged.clone(),
        );

        let rejected = Gauge::default();
        reg.register(
            "rejected",
            "Number of configuration objects currently rejected",
            rejected.clone(),
        );

        Self {
            updates,
            unchanged,
            rejected,
        }
    }
}

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let patch_succeeded = Counter::default();
        reg.register(
            "patch_succeeded",
            "Count of status writes that succeeded",
            patch_succeeded.clone(),
        );

        let patch_failed = Counter::default();
        reg.register(
            "patch_failed",
            "Count of status writes that failed",
            patch_failed.clone(),
        );

        let patch_timeout = Counter::default();
        reg.register(
            "patch_timeout",
            "Count of status writes that did not complete in time",
            patch_timeout.clone(),
        );

        Self {
            patch_succeeded,
            patch_failed,
            patch_timeout,
        }
    }
}
