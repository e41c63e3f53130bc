use crate::{
    admin,
    event_loop::{EventLoop, EventLoopMetrics},
    snapshot::{Aggregator, AggregatorMetrics},
    status,
    storage::{
        ConfigWatcher, DirectoryEndpointSource, DirectoryFileSource, DirectorySecretSource,
        DirectoryStore, EndpointWatcher, Error, Handler, ListSource, Object, PollingWatcher,
        RefWatcher,
    },
    translator::{plugins, RoleDefaults, Translator},
    xds,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, info_span, Instrument};

// Watchers only report errors on poll failures, so a small queue suffices.
const ERROR_QUEUE_SIZE: usize = 64;

#[derive(Debug, Parser)]
#[clap(name = "meridian", about = "A proxy configuration controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "meridian=info,warn",
        env = "MERIDIAN_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Directory holding the `upstreams`, `virtualhosts`, and `roles`
    /// collections. Statuses are written under `<config-dir>/status`.
    #[clap(long, default_value = "config")]
    config_dir: PathBuf,

    /// Defaults to `<config-dir>/secrets`.
    #[clap(long)]
    secret_dir: Option<PathBuf>,

    /// Defaults to `<config-dir>/files`.
    #[clap(long)]
    file_dir: Option<PathBuf>,

    /// Defaults to `<config-dir>/endpoints.yaml`.
    #[clap(long)]
    endpoints_file: Option<PathBuf>,

    #[clap(long, default_value = "2s", value_parser = humantime::parse_duration)]
    poll_interval: Duration,

    #[clap(long, default_value = "30s", value_parser = humantime::parse_duration)]
    resync_interval: Duration,

    /// How long a discovery request whose version is current waits for a
    /// change before it is answered with `304 Not Modified`.
    #[clap(long, default_value = "15s", value_parser = humantime::parse_duration)]
    discovery_poll_timeout: Duration,

    #[clap(long, default_value = "0.0.0.0:8081")]
    xds_addr: SocketAddr,

    #[clap(long, default_value = "0.0.0.0:9091")]
    admin_addr: SocketAddr,

    /// Address the default role's listeners bind to.
    #[clap(long, default_value = "::")]
    bind_address: String,

    #[clap(long, default_value = "8080")]
    http_port: u16,

    #[clap(long, default_value = "8443")]
    https_port: u16,

    #[clap(long, default_value = "5000")]
    status_patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            config_dir,
            secret_dir,
            file_dir,
            endpoints_file,
            poll_interval,
            resync_interval,
            discovery_poll_timeout,
            xds_addr,
            admin_addr,
            bind_address,
            http_port,
            https_port,
            status_patch_timeout_ms,
        } = self;

        log_format.try_init(log_level)?;

        let secret_dir = secret_dir.unwrap_or_else(|| config_dir.join("secrets"));
        let file_dir = file_dir.unwrap_or_else(|| config_dir.join("files"));
        let endpoints_file = endpoints_file.unwrap_or_else(|| config_dir.join("endpoints.yaml"));

        let mut prom = <Registry>::default();
        let aggregator_metrics =
            AggregatorMetrics::register(prom.sub_registry_with_prefix("aggregator"));
        let event_loop_metrics =
            EventLoopMetrics::register(prom.sub_registry_with_prefix("translator"));
        let cache_metrics = xds::CacheMetrics::register(prom.sub_registry_with_prefix("xds_cache"));
        let discovery_metrics =
            xds::DiscoveryMetrics::register(prom.sub_registry_with_prefix("discovery"));
        let status_registry = prom.sub_registry_with_prefix("status");
        let status_metrics = status::ControllerMetrics::register(status_registry);
        let status_index_metrics = status::IndexMetrics::register(status_registry);

        let (signal, drain) = drain::channel();
        let (watch_errors_tx, watch_errors_rx) = mpsc::channel(ERROR_QUEUE_SIZE);

        // Spawn the configuration watches. Each completes its initial listing
        // before anything else starts so that a malformed document fails
        // startup.
        let store = Arc::new(DirectoryStore::new(&config_dir));
        let config = ConfigWatcher::default();
        let latest_config = config.latest();
        spawn_watch(
            &store,
            poll_interval,
            config.upstreams(),
            &drain,
            &watch_errors_tx,
            info_span!("upstreams"),
        )
        .await?;
        spawn_watch(
            &store,
            poll_interval,
            config.virtual_hosts(),
            &drain,
            &watch_errors_tx,
            info_span!("virtualhosts"),
        )
        .await?;
        spawn_watch(
            &store,
            poll_interval,
            config.roles(),
            &drain,
            &watch_errors_tx,
            info_span!("roles"),
        )
        .await?;

        let secrets = RefWatcher::new(DirectorySecretSource::new(secret_dir), poll_interval);
        tokio::spawn(
            secrets
                .clone()
                .run(drain.clone(), watch_errors_tx.clone())
                .instrument(info_span!("secrets")),
        );

        let files = RefWatcher::new(DirectoryFileSource::new(file_dir), poll_interval);
        tokio::spawn(
            files
                .clone()
                .run(drain.clone(), watch_errors_tx.clone())
                .instrument(info_span!("files")),
        );

        let endpoints = EndpointWatcher::new(
            Arc::new(DirectoryEndpointSource::new(endpoints_file)),
            poll_interval,
        );
        let latest_endpoints = endpoints.latest();
        tokio::spawn(
            endpoints
                .run(drain.clone(), watch_errors_tx)
                .instrument(info_span!("endpoints")),
        );

        // Aggregate every input into snapshots, scoping the secret and file
        // watches to what the registered plugins declare.
        let translator = Translator::new(&plugins::defaults());
        let aggregator = Aggregator::new(
            translator.registry().clone(),
            latest_config,
            secrets,
            files,
            latest_endpoints,
            watch_errors_rx,
            aggregator_metrics,
        );
        let snapshots = aggregator.snapshots();
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_QUEUE_SIZE);
        tokio::spawn(
            aggregator
                .run(drain.clone(), errors_tx)
                .instrument(info_span!("aggregator")),
        );

        // Build the status index, which merges each role's reports and queues
        // changed statuses for the controller to write back to the store.
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let status_index = status::Index::shared(updates_tx, status_index_metrics);
        let status_controller = status::Controller::new(
            store,
            status_index.clone(),
            updates_rx,
            Duration::from_millis(status_patch_timeout_ms),
            status_metrics,
        );
        tokio::spawn(
            status_controller
                .process_updates()
                .instrument(info_span!("status_controller")),
        );

        let cache = xds::ResourceCache::new(
            xds::fallback_bundle(&bind_address, http_port),
            cache_metrics,
        );
        let event_loop = EventLoop::new(
            translator,
            RoleDefaults {
                bind_address,
                http_port,
                https_port,
            },
            cache.clone(),
            status_index,
            snapshots,
            errors_rx,
            resync_interval,
            event_loop_metrics,
        );
        let ready = event_loop.ready();
        tokio::spawn(
            event_loop
                .run(drain.clone())
                .instrument(info_span!("event_loop")),
        );

        let discovery = xds::DiscoveryService::new(cache, discovery_metrics)
            .with_poll_timeout(discovery_poll_timeout);
        let mut xds_server = tokio::spawn(
            xds::serve(xds_addr, discovery, drain.clone()).instrument(info_span!("xds")),
        );
        let mut admin_server = tokio::spawn(admin::serve(admin_addr, ready, prom, drain));

        tokio::select! {
            res = shutdown_signal() => {
                res?;
                info!("Received shutdown signal");
            }
            res = &mut xds_server => {
                res?.context("discovery server failed")?;
                bail!("Discovery server exited");
            }
            res = &mut admin_server => {
                res?.context("admin server failed")?;
                bail!("Admin server exited");
            }
        }

        // Block until every task holding a drain handle has released it.
        signal.drain().await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Completes the initial listing of one collection and spawns its poller.
async fn spawn_watch<T, S, H>(
    source: &Arc<S>,
    interval: Duration,
    handler: H,
    drain: &drain::Watch,
    errors: &mpsc::Sender<Error>,
    span: tracing::Span,
) -> Result<()>
where
    T: Object,
    S: ListSource<T>,
    H: Handler<T>,
{
    let watch = PollingWatcher::new(source.clone(), interval)
        .watch(handler)
        .await
        .with_context(|| format!("failed to list {}", T::KIND.collection()))?;
    tokio::spawn(watch.run(drain.clone(), errors.clone()).instrument(span));
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
