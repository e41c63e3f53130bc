use crate::{Error, Object, Result};
use meridian_controller_core::stable_hash;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time};
use tracing::{debug, trace, warn};

/// Receives changes from a watched collection.
///
/// Every callback is given the complete current list (sorted by name) along
/// with the object that changed.
pub trait Handler<T>: Send + 'static {
    fn on_add(&mut self, list: &[T], added: &T);

    fn on_update(&mut self, list: &[T], updated: &T);

    fn on_delete(&mut self, list: &[T], removed: &T);

    /// Called once the initial listing has been delivered, even when it was
    /// empty.
    fn on_synced(&mut self, _list: &[T]) {}
}

/// A backend that can list every object of one kind.
#[async_trait::async_trait]
pub trait ListSource<T>: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<T>>;
}

/// Watches a [`ListSource`] by polling it on a fixed interval and diffing
/// consecutive listings by name and content hash.
pub struct PollingWatcher<S> {
    source: Arc<S>,
    interval: Duration,
}

/// A watch that has completed its initial listing and may be driven with
/// [`RunHandle::run`].
#[must_use = "a RunHandle does nothing unless run"]
pub struct RunHandle<T, S, H> {
    source: Arc<S>,
    handler: H,
    interval: Duration,
    known: BTreeMap<String, (u64, T)>,
}

// === impl PollingWatcher ===

impl<S> PollingWatcher<S> {
    pub fn new(source: Arc<S>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Lists the backend once, delivering every object to `handler` as an
    /// addition, and returns a handle that keeps the handler up to date.
    pub async fn watch<T, H>(self, mut handler: H) -> Result<RunHandle<T, S, H>>
    where
        T: Object,
        S: ListSource<T>,
        H: Handler<T>,
    {
        let list = sorted(self.source.list().await?);
        let mut known = BTreeMap::new();
        for item in &list {
            known.insert(item.name().to_string(), (stable_hash(item), item.clone()));
            handler.on_add(&list, item);
        }
        handler.on_synced(&list);
        debug!(kind = %T::KIND, items = list.len(), "Initial listing complete");

        Ok(RunHandle {
            source: self.source,
            handler,
            interval: self.interval,
            known,
        })
    }
}

// === impl RunHandle ===

impl<T, S, H> RunHandle<T, S, H>
where
    T: Object,
    S: ListSource<T>,
    H: Handler<T>,
{
    /// Polls until shutdown is signaled. Listing failures are reported on
    /// `errors` and retried on the next tick.
    pub async fn run(mut self, drain: drain::Watch, errors: mpsc::Sender<Error>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The initial listing was delivered by `watch`.
        interval.tick().await;

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!(kind = %T::KIND, "Shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.source.list().await {
                Ok(list) => self.apply(sorted(list)),
                Err(error) => {
                    warn!(kind = %T::KIND, %error, "Failed to list");
                    if errors.send(error).await.is_err() {
                        trace!("Error receiver dropped");
                    }
                }
            }
        }
    }

    fn apply(&mut self, list: Vec<T>) {
        let mut current = BTreeMap::new();
        for item in &list {
            let name = item.name().to_string();
            let hash = stable_hash(item);
            match self.known.get(&name) {
                None => {
                    trace!(kind = %T::KIND, %name, "Added");
                    self.handler.on_add(&list, item);
                }
                Some((prior, _)) if *prior != hash => {
                    trace!(kind = %T::KIND, %name, "Updated");
                    self.handler.on_update(&list, item);
                }
                Some(_) => {}
            }
            current.insert(name, (hash, item.clone()));
        }

        let removed = self
            .known
            .iter()
            .filter(|(name, _)| !current.contains_key(*name))
            .map(|(_, (_, item))| item.clone())
            .collect::<Vec<_>>();
        for item in &removed {
            trace!(kind = %T::KIND, name = %item.name(), "Deleted");
            self.handler.on_delete(&list, item);
        }

        self.known = current;
    }
}

fn sorted<T: Object>(mut list: Vec<T>) -> Vec<T> {
    list.sort_by(|a, b| a.name().cmp(b.name()));
    list
}
