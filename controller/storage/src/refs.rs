use crate::{Error, Result};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, trace, warn};

/// A backend that fetches individual items (secrets, files) by reference.
#[async_trait::async_trait]
pub trait RefSource: Send + Sync + 'static {
    type Item: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Returns `None` when the reference does not exist (yet).
    async fn fetch(&self, reference: &str) -> Result<Option<Self::Item>>;
}

/// Polls a [`RefSource`] for the currently tracked references and publishes
/// the latest map of everything found.
///
/// The published value is `None` until the first refresh completes.
pub struct RefWatcher<S: RefSource> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: RefSource> {
    source: S,
    interval: Duration,
    refs: Mutex<BTreeSet<String>>,
    refreshing: tokio::sync::Mutex<()>,
    tx: watch::Sender<Option<BTreeMap<String, S::Item>>>,
}

// === impl RefWatcher ===

impl<S: RefSource> Clone for RefWatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: RefSource> RefWatcher<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                refs: Mutex::new(BTreeSet::new()),
                refreshing: tokio::sync::Mutex::new(()),
                tx,
            }),
        }
    }

    /// Replaces the set of tracked references and refreshes immediately.
    pub async fn track<I, R>(&self, refs: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: ToString,
    {
        let refs = refs.into_iter().map(|r| r.to_string()).collect::<BTreeSet<_>>();
        {
            let mut tracked = self.inner.refs.lock();
            if *tracked != refs {
                debug!(?refs, "Tracking");
                *tracked = refs;
            }
        }
        self.refresh().await
    }

    pub fn latest(&self) -> watch::Receiver<Option<BTreeMap<String, S::Item>>> {
        self.inner.tx.subscribe()
    }

    /// Refreshes every tracked reference on the configured interval until
    /// shutdown is signaled.
    pub async fn run(self, drain: drain::Watch, errors: mpsc::Sender<Error>) {
        let mut interval = time::interval(self.inner.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("Shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            if let Err(error) = self.refresh().await {
                warn!(%error, "Failed to refresh");
                if errors.send(error).await.is_err() {
                    trace!("Error receiver dropped");
                }
            }
        }
    }

    /// Fetches every tracked reference. References that don't exist are
    /// left out of the published map; a fetch error leaves the previously
    /// published map in place.
    async fn refresh(&self) -> Result<()> {
        let _guard = self.inner.refreshing.lock().await;
        let refs = self.inner.refs.lock().clone();

        let mut found = BTreeMap::new();
        for reference in refs {
            if let Some(item) = self.inner.source.fetch(&reference).await? {
                found.insert(reference, item);
            }
        }

        let changed = self.inner.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&found) {
                return false;
            }
            *current = Some(found);
            true
        });
        if changed {
            trace!("Published new items");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use maplit::btreemap;
    use meridian_controller_core::Secret;
    use pretty_assertions::assert_eq;

    fn secret(reference: &str, value: &str) -> Secret {
        Secret::new(reference, btreemap! { "key".into() => value.into() })
    }

    #[tokio::test]
    async fn track_refreshes_immediately() {
        let store = Arc::new(MemoryStore::default());
        store.put_secret(secret("a", "1"));
        store.put_secret(secret("b", "2"));

        let watcher = RefWatcher::new(SharedSource(store.clone()), Duration::from_secs(60));
        let mut latest = watcher.latest();
        assert_eq!(*latest.borrow_and_update(), None);

        watcher.track(["a", "missing"]).await.unwrap();
        assert!(latest.has_changed().unwrap());
        assert_eq!(
            *latest.borrow_and_update(),
            Some(btreemap! { "a".to_string() => secret("a", "1") })
        );

        // Re-tracking the same references with no upstream change publishes
        // nothing.
        watcher.track(["missing", "a"]).await.unwrap();
        assert!(!latest.has_changed().unwrap());
    }

    #[tokio::test]
    async fn tracking_nothing_is_observed() {
        let watcher = RefWatcher::new(MemoryStore::default(), Duration::from_secs(60));
        watcher.track(Vec::<String>::new()).await.unwrap();
        assert_eq!(*watcher.latest().borrow(), Some(BTreeMap::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_for_changes() {
        let store = Arc::new(MemoryStore::default());
        let watcher = RefWatcher::new(SharedSource(store.clone()), Duration::from_secs(1));
        watcher.track(["a"]).await.unwrap();
        let mut latest = watcher.latest();
        latest.borrow_and_update();

        let (signal, drain) = drain::channel();
        let (errors_tx, _errors_rx) = mpsc::channel(1);
        let task = tokio::spawn(watcher.clone().run(drain, errors_tx));

        store.put_secret(secret("a", "1"));
        latest.changed().await.unwrap();
        assert_eq!(
            *latest.borrow_and_update(),
            Some(btreemap! { "a".to_string() => secret("a", "1") })
        );

        store.remove_secret("a");
        latest.changed().await.unwrap();
        assert_eq!(*latest.borrow_and_update(), Some(BTreeMap::new()));

        signal.drain().await;
        task.await.unwrap();
    }

    struct SharedSource(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl RefSource for SharedSource {
        type Item = Secret;

        async fn fetch(&self, reference: &str) -> Result<Option<Secret>> {
            self.0.fetch(reference).await
        }
    }
}
