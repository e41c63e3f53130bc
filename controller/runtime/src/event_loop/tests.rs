use super::*;
use meridian_controller_core::{
    Config, Endpoint, EndpointGroups, ResourceRef, Role, RoleListener, Route, Status, Upstream,
    VirtualHost, DEFAULT_ROLE_NAME,
};
use meridian_controller_status::{Index, IndexMetrics, Update};
use meridian_controller_translator::plugins;
use meridian_controller_xds::{fallback_bundle, CacheMetrics};
use pretty_assertions::assert_eq;

struct Fixture {
    event_loop: EventLoop,
    cache: ResourceCache,
    status: SharedIndex,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    errors: mpsc::Sender<Error>,
    updates: mpsc::UnboundedReceiver<Update>,
}

fn fixture() -> Fixture {
    let cache = ResourceCache::new(fallback_bundle("::", 8080), CacheMetrics::default());
    let (updates_tx, updates) = mpsc::unbounded_channel();
    let status = Index::shared(updates_tx, IndexMetrics::register(&mut Default::default()));
    let (snapshots, snapshots_rx) = watch::channel(None);
    let (errors, errors_rx) = mpsc::channel(8);
    let event_loop = EventLoop::new(
        Translator::new(&plugins::defaults()),
        RoleDefaults::default(),
        cache.clone(),
        status.clone(),
        snapshots_rx,
        errors_rx,
        Duration::from_secs(30),
        EventLoopMetrics::default(),
    );
    Fixture {
        event_loop,
        cache,
        status,
        snapshots,
        errors,
        updates,
    }
}

fn tenant(vhosts: &[&str]) -> Role {
    Role {
        name: "tenant".to_string(),
        listeners: vec![RoleListener {
            name: "edge".to_string(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 10080,
            ssl: false,
            virtual_hosts: vhosts.iter().map(|v| v.to_string()).collect(),
        }],
    }
}

fn snapshot(target: &str, roles: Vec<Role>) -> Snapshot {
    let upstreams = ["svc-a", "svc-b"]
        .iter()
        .map(|name| Upstream::new(name, plugins::SERVICE_TYPE))
        .collect();
    let vhost = VirtualHost {
        name: "vh1".to_string(),
        routes: vec![Route::to_upstream(target)],
        ..Default::default()
    };
    let endpoints = ["svc-a", "svc-b"]
        .iter()
        .map(|name| (name.to_string(), vec![Endpoint::new("10.0.0.1", 8080)]))
        .collect::<EndpointGroups>();
    let config = Config::new(upstreams, vec![vhost], roles);
    Snapshot::new(config, Default::default(), Default::default(), endpoints)
}

#[test]
fn installs_clean_roles() {
    let Fixture {
        event_loop,
        cache,
        status,
        ..
    } = fixture();
    event_loop.sync(&snapshot("svc-a", vec![tenant(&["vh1"])]));

    assert_eq!(cache.keys(), vec![DEFAULT_ROLE_NAME, "tenant"]);
    assert_eq!(
        status.read().status(&ResourceRef::virtual_host("vh1")),
        Some(&Status::accepted())
    );
    assert!(*event_loop.ready().borrow());
}

#[test]
fn a_failing_role_does_not_block_others() {
    let Fixture {
        event_loop,
        cache,
        status,
        ..
    } = fixture();
    event_loop.sync(&snapshot("svc-a", vec![tenant(&["vh1", "gone"])]));

    assert_eq!(cache.keys(), vec![DEFAULT_ROLE_NAME]);
    assert_eq!(
        status.read().status(&ResourceRef::role("tenant")),
        Some(&Status::rejected(
            "tenant: listener edge: virtual host gone not found"
        ))
    );
}

#[test]
fn errors_keep_the_previous_bundle() {
    let Fixture {
        event_loop, cache, ..
    } = fixture();
    event_loop.sync(&snapshot("svc-a", vec![]));
    let served = cache.get_snapshot(DEFAULT_ROLE_NAME);

    event_loop.sync(&snapshot("svc-missing", vec![]));
    assert_eq!(cache.get_snapshot(DEFAULT_ROLE_NAME), served);

    event_loop.sync(&snapshot("svc-b", vec![]));
    assert_ne!(cache.get_snapshot(DEFAULT_ROLE_NAME).version, served.version);
}

#[test]
fn removed_roles_fall_back() {
    let Fixture {
        event_loop,
        cache,
        status,
        ..
    } = fixture();
    event_loop.sync(&snapshot("svc-a", vec![tenant(&["vh1", "gone"])]));
    assert!(status.read().status(&ResourceRef::role("tenant")).is_some());

    event_loop.sync(&snapshot("svc-a", vec![]));
    assert_eq!(cache.get_snapshot("tenant"), cache.fallback());
    assert_eq!(status.read().status(&ResourceRef::role("tenant")), None);
}

#[test]
fn resyncs_do_not_resend_statuses() {
    let Fixture {
        event_loop,
        mut updates,
        ..
    } = fixture();
    let snapshot = snapshot("svc-a", vec![]);

    event_loop.sync(&snapshot);
    let mut sent = vec![];
    while let Ok(update) = updates.try_recv() {
        sent.push(update.id);
    }
    assert!(sent.contains(&ResourceRef::upstream("svc-a")), "{sent:?}");

    event_loop.sync(&snapshot);
    assert!(updates.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn runs_until_drained() {
    let Fixture {
        event_loop,
        cache,
        snapshots,
        errors,
        ..
    } = fixture();
    let mut ready = event_loop.ready();
    let (signal, drain) = drain::channel();
    let task = tokio::spawn(event_loop.run(drain));

    snapshots.send_replace(Some(Arc::new(snapshot("svc-a", vec![]))));
    ready.changed().await.unwrap();
    assert!(cache.contains(DEFAULT_ROLE_NAME));

    // Input errors do not disturb what is served.
    errors
        .send(Error::NotFound {
            kind: meridian_controller_core::ResourceKind::Upstream,
            name: "svc-a".to_string(),
        })
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert!(cache.contains(DEFAULT_ROLE_NAME));

    signal.drain().await;
    task.await.unwrap();
}
