use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    pub(crate) installs: Counter,
    pub(crate) unchanged: Counter,
    pub(crate) removals: Counter,
    pub(crate) fallback_hits: Counter,
}

#[derive(Clone, Debug, Default)]
pub struct DiscoveryMetrics {
    requests: Family<RequestLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RequestLabels {
    resource: &'static str,
    outcome: &'static str,
}

// === impl CacheMetrics ===

impl CacheMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let installs = Counter::default();
        reg.register(
            "installs",
            "Count of role bundles installed in the cache",
            installs.clone(),
        );

        let unchanged = Counter::default();
        reg.register(
            "unchanged",
            "Count of installs skipped because the bundle version was already served",
            unchanged.clone(),
        );

        let removals = Counter::default();
        reg.register(
            "removals",
            "Count of roles removed from the cache",
            removals.clone(),
        );

        let fallback_hits = Counter::default();
        reg.register(
            "fallback_hits",
            "Count of lookups answered with the fallback bundle",
            fallback_hits.clone(),
        );

        Self {
            installs,
            unchanged,
            removals,
            fallback_hits,
        }
    }
}

// === impl DiscoveryMetrics ===

impl DiscoveryMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        reg.register(
            "requests",
            "Count of discovery requests by resource type and outcome",
            requests.clone(),
        );
        Self { requests }
    }

    pub(crate) fn observe(&self, resource: &'static str, outcome: &'static str) {
        self.requests
            .get_or_create(&RequestLabels { resource, outcome })
            .inc();
    }
}
