use crate::watcher::Handler;
use meridian_controller_core::{Config, Role, Upstream, VirtualHost};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Combines the upstream, virtual host, and role watches into a single
/// [`Config`].
///
/// Nothing is published until every kind has been listed at least once;
/// afterwards each change republishes the whole config.
#[derive(Clone)]
pub struct ConfigWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    partial: Mutex<Partial>,
    tx: watch::Sender<Option<Config>>,
}

#[derive(Default)]
struct Partial {
    upstreams: Option<Vec<Upstream>>,
    virtual_hosts: Option<Vec<VirtualHost>>,
    roles: Option<Vec<Role>>,
}

/// Feeds one kind of object into a [`ConfigWatcher`].
pub struct ConfigHandler<T> {
    inner: Arc<Inner>,
    store: fn(&mut Partial, Vec<T>),
}

// === impl ConfigWatcher ===

impl Default for ConfigWatcher {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                partial: Mutex::new(Partial::default()),
                tx,
            }),
        }
    }
}

impl ConfigWatcher {
    pub fn latest(&self) -> watch::Receiver<Option<Config>> {
        self.inner.tx.subscribe()
    }

    pub fn upstreams(&self) -> ConfigHandler<Upstream> {
        self.handler(|p, list| p.upstreams = Some(list))
    }

    pub fn virtual_hosts(&self) -> ConfigHandler<VirtualHost> {
        self.handler(|p, list| p.virtual_hosts = Some(list))
    }

    pub fn roles(&self) -> ConfigHandler<Role> {
        self.handler(|p, list| p.roles = Some(list))
    }

    fn handler<T>(&self, store: fn(&mut Partial, Vec<T>)) -> ConfigHandler<T> {
        ConfigHandler {
            inner: self.inner.clone(),
            store,
        }
    }
}

// === impl ConfigHandler ===

impl<T: Clone> ConfigHandler<T> {
    fn set(&mut self, list: &[T]) {
        let mut partial = self.inner.partial.lock();
        (self.store)(&mut partial, list.to_vec());

        let Partial {
            upstreams: Some(upstreams),
            virtual_hosts: Some(virtual_hosts),
            roles: Some(roles),
        } = &*partial
        else {
            trace!("Waiting for every config kind to be listed");
            return;
        };

        let config = Config::new(upstreams.clone(), virtual_hosts.clone(), roles.clone());
        self.inner.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&config) {
                return false;
            }
            *current = Some(config);
            true
        });
    }
}

impl<T: Clone + Send + 'static> Handler<T> for ConfigHandler<T> {
    fn on_add(&mut self, list: &[T], _: &T) {
        self.set(list)
    }

    fn on_update(&mut self, list: &[T], _: &T) {
        self.set(list)
    }

    fn on_delete(&mut self, list: &[T], _: &T) {
        self.set(list)
    }

    fn on_synced(&mut self, list: &[T]) {
        self.set(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn publishes_once_every_kind_is_listed() {
        let watcher = ConfigWatcher::default();
        let mut latest = watcher.latest();

        let a = Upstream::new("a", "service");
        watcher.upstreams().on_add(&[a.clone()], &a);
        watcher.virtual_hosts().on_synced(&[]);
        assert_eq!(*latest.borrow_and_update(), None);

        watcher.roles().on_synced(&[]);
        assert!(latest.has_changed().unwrap());
        assert_eq!(
            *latest.borrow_and_update(),
            Some(Config::new(vec![a.clone()], vec![], vec![]))
        );

        // Redelivering identical lists does not republish.
        watcher.upstreams().on_update(&[a.clone()], &a);
        assert!(!latest.has_changed().unwrap());

        watcher.upstreams().on_delete(&[], &a);
        assert_eq!(*latest.borrow_and_update(), Some(Config::default()));
    }
}
