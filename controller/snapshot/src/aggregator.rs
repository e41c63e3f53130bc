use crate::{
    metrics::AggregatorMetrics,
    resolver::{merge, resolve},
    Snapshot,
};
use meridian_controller_core::{
    plugin::{Dependencies, Registry},
    Config, EndpointGroups, File, Secret,
};
use meridian_controller_storage::{Error, RefSource, RefWatcher};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// Merges the config, secret, file, and endpoint watches into snapshots.
///
/// A snapshot is published only when every input has been observed, every
/// declared secret and file is present, and its content differs from the
/// last one published.
pub struct Aggregator<S: RefSource<Item = Secret>, F: RefSource<Item = File>> {
    registry: Registry,
    config: watch::Receiver<Option<Config>>,
    secrets: RefWatcher<S>,
    files: RefWatcher<F>,
    endpoints: watch::Receiver<Option<EndpointGroups>>,
    watcher_errors: mpsc::Receiver<Error>,
    tx: watch::Sender<Option<Arc<Snapshot>>>,
    last_hash: Option<u64>,
    metrics: AggregatorMetrics,
}

#[derive(Debug, PartialEq, Eq)]
enum NotReady {
    Unobserved(&'static str),
    MissingSecret(String),
    MissingFile(String),
}

impl<S, F> Aggregator<S, F>
where
    S: RefSource<Item = Secret>,
    F: RefSource<Item = File>,
{
    pub fn new(
        registry: Registry,
        config: watch::Receiver<Option<Config>>,
        secrets: RefWatcher<S>,
        files: RefWatcher<F>,
        endpoints: watch::Receiver<Option<EndpointGroups>>,
        watcher_errors: mpsc::Receiver<Error>,
        metrics: AggregatorMetrics,
    ) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            registry,
            config,
            secrets,
            files,
            endpoints,
            watcher_errors,
            tx,
            last_hash: None,
            metrics,
        }
    }

    /// Returns a receiver that always holds the latest ready snapshot.
    pub fn snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }

    /// Runs until shutdown is signaled or the config watch closes. Watcher
    /// errors, and errors refreshing newly tracked references, are forwarded
    /// on `errors`; none of them stop aggregation.
    pub async fn run(mut self, drain: drain::Watch, errors: mpsc::Sender<Error>) {
        let mut secrets = self.secrets.latest();
        let mut files = self.files.latest();

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        // A config may have been published before we started.
        self.config.mark_changed();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Shutting down");
                    return;
                }

                Some(error) = self.watcher_errors.recv() => {
                    self.metrics.watcher_errors.inc();
                    forward(&errors, error).await;
                    continue;
                }

                res = self.config.changed() => {
                    if res.is_err() {
                        debug!("Config watch closed");
                        return;
                    }
                    let config = self.config.borrow_and_update().clone();
                    if let Some(config) = config {
                        self.track(&config, &errors).await;
                    }
                }

                res = secrets.changed() => {
                    if res.is_err() {
                        return;
                    }
                }

                res = files.changed() => {
                    if res.is_err() {
                        return;
                    }
                }

                res = self.endpoints.changed() => {
                    if res.is_err() {
                        debug!("Endpoint watch closed");
                        return;
                    }
                }
            }

            let snapshot = {
                let secrets = secrets.borrow_and_update();
                let files = files.borrow_and_update();
                let endpoints = self.endpoints.borrow_and_update();
                let config = self.config.borrow();
                build(&self.registry, &config, &secrets, &files, &endpoints)
            };
            self.publish(snapshot);
        }
    }

    /// Scopes the secret and file watchers to what the config's plugins
    /// declare, refreshing them immediately.
    async fn track(&self, config: &Config, errors: &mpsc::Sender<Error>) {
        let Dependencies {
            secret_refs,
            file_refs,
        } = merge(&resolve(config, &self.registry));

        if let Err(error) = self.secrets.track(secret_refs).await {
            forward(errors, error).await;
        }
        if let Err(error) = self.files.track(file_refs).await {
            forward(errors, error).await;
        }
    }

    fn publish(&mut self, snapshot: Result<Snapshot, NotReady>) {
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                trace!(?reason, "Snapshot not ready");
                self.metrics.not_ready.inc();
                return;
            }
        };

        if self.last_hash == Some(snapshot.hash()) {
            trace!(hash = snapshot.hash(), "Snapshot unchanged");
            self.metrics.duplicates.inc();
            return;
        }

        debug!(hash = snapshot.hash(), "Publishing snapshot");
        self.last_hash = Some(snapshot.hash());
        self.metrics.emitted.inc();
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

fn build(
    registry: &Registry,
    config: &Option<Config>,
    secrets: &Option<BTreeMap<String, Secret>>,
    files: &Option<BTreeMap<String, File>>,
    endpoints: &Option<EndpointGroups>,
) -> Result<Snapshot, NotReady> {
    let config = config.as_ref().ok_or(NotReady::Unobserved("config"))?;
    let secrets = secrets.as_ref().ok_or(NotReady::Unobserved("secrets"))?;
    let files = files.as_ref().ok_or(NotReady::Unobserved("files"))?;
    let endpoints = endpoints
        .as_ref()
        .ok_or(NotReady::Unobserved("endpoints"))?;

    let deps = merge(&resolve(config, registry));
    if let Some(missing) = deps.secret_refs.iter().find(|r| !secrets.contains_key(*r)) {
        return Err(NotReady::MissingSecret(missing.clone()));
    }
    if let Some(missing) = deps.file_refs.iter().find(|r| !files.contains_key(*r)) {
        return Err(NotReady::MissingFile(missing.clone()));
    }

    // The watchers may briefly hold references that are no longer declared.
    let (secrets, files) = deps.scope(secrets, files);
    Ok(Snapshot::new(config.clone(), secrets, files, endpoints.clone()))
}

async fn forward(errors: &mpsc::Sender<Error>, error: Error) {
    warn!(%error, "Input error");
    if errors.send(error).await.is_err() {
        trace!("Error receiver dropped");
    }
}
