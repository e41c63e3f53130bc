use super::*;
use crate::{Controller, ControllerMetrics};
use meridian_controller_core::{Status, Upstream};
use meridian_controller_storage::{ConfigStore, MemoryStore, Result, Versioned};
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn writes_merged_status() {
    let store = Arc::new(MemoryStore::default());
    let (index, updates) = index();
    let controller = Controller::new(
        store.clone(),
        index.clone(),
        updates,
        Duration::from_secs(1),
        ControllerMetrics::default(),
    );

    let up = ResourceRef::upstream("svc-a");
    index
        .write()
        .apply_reports("gateway", vec![err(up.clone(), "hosts were empty")]);
    drop(index);

    controller.process_updates().await;
    assert_eq!(
        store.status(&up),
        Some(Status::rejected("gateway: hosts were empty"))
    );
}

/// A store whose status writes never complete.
struct Stuck;

#[async_trait::async_trait]
impl ConfigStore for Stuck {
    async fn read_upstream(&self, _: &str) -> Result<Versioned<Upstream>> {
        unimplemented!()
    }

    async fn write_upstream(&self, _: &Upstream, _: &str) -> Result<Versioned<Upstream>> {
        unimplemented!()
    }

    async fn write_status(&self, _: &ResourceRef, _: &Status) -> Result<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_writes_are_retried_on_the_next_pass() {
    let (index, updates) = index();
    let metrics = ControllerMetrics::default();
    let controller = Controller::new(
        Arc::new(Stuck),
        index.clone(),
        updates,
        Duration::from_secs(5),
        metrics.clone(),
    );
    let task = tokio::spawn(controller.process_updates());

    let vh = ResourceRef::virtual_host("vh1");
    index.write().apply_reports("gateway", vec![ok(vh.clone())]);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(metrics.patch_timeout.get(), 1);
    assert_eq!(index.read().status(&vh), None);

    // The same report is sent again because the failed write was forgotten.
    index.write().apply_reports("gateway", vec![ok(vh.clone())]);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(metrics.patch_timeout.get(), 2);

    drop(index);
    task.abort();
}
