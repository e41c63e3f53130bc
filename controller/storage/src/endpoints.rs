use crate::{Error, Result};
use meridian_controller_core::{canonicalize_endpoints, EndpointGroups};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, trace, warn};

/// Externally discovered endpoints, loaded in full on every poll.
#[async_trait::async_trait]
pub trait EndpointSource: Send + Sync + 'static {
    async fn load(&self) -> Result<EndpointGroups>;
}

/// Publishes the latest endpoint groups whenever they change.
pub struct EndpointWatcher<S> {
    source: Arc<S>,
    interval: Duration,
    tx: watch::Sender<Option<EndpointGroups>>,
}

impl<S: EndpointSource> EndpointWatcher<S> {
    pub fn new(source: Arc<S>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            source,
            interval,
            tx,
        }
    }

    pub fn latest(&self) -> watch::Receiver<Option<EndpointGroups>> {
        self.tx.subscribe()
    }

    pub async fn run(self, drain: drain::Watch, errors: mpsc::Sender<Error>) {
        let mut interval = time::interval(self.interval);
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

            match self.source.load().await {
                Ok(groups) => {
                    let groups = canonicalize_endpoints(groups);
                    let changed = self.tx.send_if_modified(|current| {
                        if current.as_ref() == Some(&groups) {
                            return false;
                        }
                        *current = Some(groups);
                        true
                    });
                    if changed {
                        trace!("Published endpoints");
                    }
                }
                Err(error) => {
                    warn!(%error, "Failed to load endpoints");
                    if errors.send(error).await.is_err() {
                        trace!("Error receiver dropped");
                    }
                }
            }
        }
    }
}
