use super::*;
use crate::{fallback_bundle, metrics::CacheMetrics, DiscoveryResponse, FALLBACK_BODY};
use meridian_controller_core::resources::{Cluster, ResourceBundle};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn service() -> (ResourceCache, DiscoveryService) {
    let cache = ResourceCache::new(fallback_bundle("::", 8080), CacheMetrics::default());
    let svc = DiscoveryService::new(cache.clone(), DiscoveryMetrics::default())
        .with_poll_timeout(Duration::from_secs(1));
    (cache, svc)
}

fn bundle(clusters: &[&str]) -> ResourceBundle {
    let clusters = clusters
        .iter()
        .map(|name| Cluster {
            name: name.to_string(),
            ..Default::default()
        })
        .collect();
    ResourceBundle::new(clusters, vec![], vec![], vec![])
}

fn discovery(resource: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri(format!("/v3/discovery:{resource}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(http::Method::GET)
        .uri(path)
        .body(Body::default())
        .unwrap()
}

async fn call(svc: &DiscoveryService, req: Request<Body>) -> (http::StatusCode, Bytes) {
    let rsp = svc.clone().oneshot(req).await.unwrap();
    let status = rsp.status();
    let body = rsp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn unmatched_nodes_get_the_fallback() {
    let (_cache, svc) = service();
    let (status, body) = call(
        &svc,
        discovery("listeners", json!({ "node": { "id": "p1", "cluster": "nobody" } })),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);

    let rsp: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(rsp["resources"][0]["name"], json!("fallback"));
    assert!(body
        .windows(FALLBACK_BODY.len())
        .any(|w| w == FALLBACK_BODY.as_bytes()));
}

#[tokio::test]
async fn nodes_are_grouped_by_role() {
    let (cache, svc) = service();
    let installed = bundle(&["svc-a", "svc-b"]);
    cache.set_snapshot("gateway", installed.clone());

    let (status, body) = call(
        &svc,
        discovery(
            "clusters",
            json!({
                "node": { "id": "p1", "cluster": "edge", "metadata": { "role": "gateway" } },
                "resource_names": ["svc-b"],
            }),
        ),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    let rsp: DiscoveryResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(rsp.version_info, installed.version);
    assert_eq!(rsp.type_url, ResourceType::Clusters.type_url());
    assert_eq!(rsp.resources.len(), 1);
    assert_eq!(rsp.resources[0]["name"], json!("svc-b"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn current_version_times_out() {
    let (cache, svc) = service();
    let installed = bundle(&["svc-a"]);
    cache.set_snapshot("gateway", installed.clone());

    let (status, _) = call(
        &svc,
        discovery(
            "clusters",
            json!({
                "version_info": installed.version,
                "node": { "cluster": "gateway" },
            }),
        ),
    )
    .await;
    assert_eq!(status, http::StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn current_version_waits_for_an_update() {
    let (cache, svc) = service();
    let first = bundle(&["svc-a"]);
    cache.set_snapshot("gateway", first.clone());

    let req = discovery(
        "clusters",
        json!({
            "version_info": first.version,
            "node": { "cluster": "gateway" },
        }),
    );
    let mut poll = tokio_test::task::spawn(call(&svc, req));
    tokio_test::assert_pending!(poll.poll());

    // Installing another role's bundle does not answer the poll.
    cache.set_snapshot("tenant", bundle(&["svc-c"]));
    assert!(poll.is_woken());
    tokio_test::assert_pending!(poll.poll());

    let second = bundle(&["svc-a", "svc-b"]);
    cache.set_snapshot("gateway", second.clone());
    assert!(poll.is_woken());
    let (status, body) = tokio_test::assert_ready!(poll.poll());
    assert_eq!(status, http::StatusCode::OK);
    let rsp: DiscoveryResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(rsp.version_info, second.version);
    assert_eq!(rsp.resources.len(), 2);
}

#[tokio::test]
async fn snapshot_endpoints() {
    let (cache, svc) = service();
    let installed = bundle(&["svc-a"]);
    cache.set_snapshot("gateway", installed.clone());

    let (status, body) = call(&svc, get("/snapshots")).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Vec<String>>(&body).unwrap(),
        vec!["gateway"]
    );

    let (status, body) = call(&svc, get("/snapshots/gateway")).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<ResourceBundle>(&body).unwrap(),
        installed
    );

    let (status, _) = call(&svc, get("/snapshots/tenant")).await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_malformed_requests() {
    let (_cache, svc) = service();

    let req = Request::builder()
        .method(http::Method::POST)
        .uri("/v3/discovery:routes")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = call(&svc, req).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);

    let (status, _) = call(&svc, get("/v3/discovery:routes")).await;
    assert_eq!(status, http::StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&svc, get("/v3/discovery:secrets")).await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);
}
