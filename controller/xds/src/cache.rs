use crate::metrics::CacheMetrics;
use ahash::AHashMap as HashMap;
use meridian_controller_core::resources::ResourceBundle;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// The bundles currently served, keyed by role name.
///
/// Written by the event loop and read concurrently by discovery requests.
/// Lookups for keys with no installed bundle return the fallback bundle.
#[derive(Clone, Debug)]
pub struct ResourceCache {
    inner: Arc<RwLock<HashMap<String, Arc<ResourceBundle>>>>,
    fallback: Arc<ResourceBundle>,
    updates: Arc<watch::Sender<u64>>,
    metrics: CacheMetrics,
}

impl ResourceCache {
    pub fn new(fallback: ResourceBundle, metrics: CacheMetrics) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            inner: Default::default(),
            fallback: Arc::new(fallback),
            updates: Arc::new(updates),
            metrics,
        }
    }

    /// Installs `bundle` for `role`. Returns false if the same version is
    /// already being served.
    pub fn set_snapshot(&self, role: &str, bundle: ResourceBundle) -> bool {
        {
            let mut roles = self.inner.write();
            if let Some(current) = roles.get(role) {
                if current.version == bundle.version {
                    debug!(%role, version = %bundle.version, "Bundle unchanged");
                    self.metrics.unchanged.inc();
                    return false;
                }
            }
            info!(%role, version = %bundle.version, "Installing bundle");
            roles.insert(role.to_string(), Arc::new(bundle));
        }
        self.metrics.installs.inc();
        self.notify();
        true
    }

    /// Returns the bundle for the proxy group `key`, or the fallback bundle
    /// if no role by that name is installed.
    pub fn get_snapshot(&self, key: &str) -> Arc<ResourceBundle> {
        if let Some(bundle) = self.inner.read().get(key) {
            return bundle.clone();
        }
        self.metrics.fallback_hits.inc();
        self.fallback.clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Removes every role for which `keep` returns false, so their proxies
    /// fall back.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        let removed = {
            let mut roles = self.inner.write();
            let before = roles.len();
            roles.retain(|role, _| {
                let kept = keep(role.as_str());
                if !kept {
                    info!(%role, "Removing stale role");
                }
                kept
            });
            before - roles.len()
        };
        if removed > 0 {
            self.metrics.removals.inc_by(removed as u64);
            self.notify();
        }
    }

    /// Lists the installed role names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.inner.read().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn fallback(&self) -> Arc<ResourceBundle> {
        self.fallback.clone()
    }

    /// Signals each time any role's bundle changes.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn notify(&self) {
        self.updates.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback_bundle;
    use meridian_controller_core::resources::Cluster;
    use pretty_assertions::assert_eq;

    fn bundle(cluster: &str) -> ResourceBundle {
        let cluster = Cluster {
            name: cluster.to_string(),
            ..Default::default()
        };
        ResourceBundle::new(vec![cluster], vec![], vec![], vec![])
    }

    fn cache() -> ResourceCache {
        ResourceCache::new(fallback_bundle("::", 8080), CacheMetrics::default())
    }

    #[test]
    fn unknown_keys_get_the_fallback() {
        let cache = cache();
        assert_eq!(cache.get_snapshot("nobody"), cache.fallback());
        assert_eq!(cache.metrics.fallback_hits.get(), 1);
    }

    #[test]
    fn identical_versions_are_not_reinstalled() {
        let cache = cache();
        let mut updates = cache.updates();

        assert!(cache.set_snapshot("gateway", bundle("a")));
        assert!(updates.has_changed().unwrap());
        updates.mark_unchanged();

        assert!(!cache.set_snapshot("gateway", bundle("a")));
        assert!(!updates.has_changed().unwrap());

        assert!(cache.set_snapshot("gateway", bundle("b")));
        assert_eq!(cache.get_snapshot("gateway").clusters[0].name, "b");
        assert_eq!(cache.metrics.installs.get(), 2);
        assert_eq!(cache.metrics.unchanged.get(), 1);
    }

    #[test]
    fn retained_roles_survive() {
        let cache = cache();
        cache.set_snapshot("gateway", bundle("a"));
        cache.set_snapshot("tenant", bundle("b"));
        assert_eq!(cache.keys(), vec!["gateway", "tenant"]);

        cache.retain(|role| role == "gateway");
        assert_eq!(cache.keys(), vec!["gateway"]);
        assert_eq!(cache.get_snapshot("tenant"), cache.fallback());
    }
}
