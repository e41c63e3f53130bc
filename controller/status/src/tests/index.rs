use super::*;
use meridian_controller_core::Status;
use pretty_assertions::assert_eq;

#[test]
fn accepted_once() {
    let (index, mut updates) = index();
    let vh = ResourceRef::virtual_host("vh1");

    index.write().apply_reports("gateway", vec![ok(vh.clone())]);
    assert_eq!(
        updates.try_recv().unwrap(),
        Update {
            id: vh.clone(),
            status: Status::accepted(),
        }
    );

    // A resync with identical reports sends nothing.
    index.write().apply_reports("gateway", vec![ok(vh.clone())]);
    assert!(updates.try_recv().is_err());
}

#[test]
fn any_role_error_rejects() {
    let (index, mut updates) = index();
    let up = ResourceRef::upstream("svc-a");

    index.write().apply_reports("gateway", vec![ok(up.clone())]);
    index
        .write()
        .apply_reports("tenant", vec![err(up.clone(), "secret aws not found")]);

    let _accepted = updates.try_recv().unwrap();
    let rejected = updates.try_recv().unwrap();
    assert_eq!(
        rejected.status,
        Status::rejected("tenant: secret aws not found")
    );

    // The tenant's next pass replaces its earlier report.
    index.write().apply_reports("tenant", vec![ok(up.clone())]);
    assert_eq!(updates.try_recv().unwrap().status, Status::accepted());
    assert_eq!(index.read().status(&up), Some(&Status::accepted()));
}

#[test]
fn errors_from_several_roles_are_combined() {
    let (index, mut updates) = index();
    let up = ResourceRef::upstream("svc-a");

    index
        .write()
        .apply_reports("tenant", vec![err(up.clone(), "second")]);
    index
        .write()
        .apply_reports("gateway", vec![err(up.clone(), "first")]);

    let _ = updates.try_recv().unwrap();
    assert_eq!(
        updates.try_recv().unwrap().status,
        Status::rejected("gateway: first\ntenant: second")
    );
}

#[test]
fn removed_roles_stop_contributing() {
    let (index, mut updates) = index();
    let up = ResourceRef::upstream("svc-a");

    index.write().apply_reports("gateway", vec![ok(up.clone())]);
    index
        .write()
        .apply_reports("tenant", vec![err(up.clone(), "broken")]);
    while updates.try_recv().is_ok() {}

    index.write().retain_roles(|role| role == "gateway");
    assert_eq!(updates.try_recv().unwrap().status, Status::accepted());
}

#[test]
fn objects_no_longer_reported_are_dropped() {
    let (index, mut updates) = index();
    let vh = ResourceRef::virtual_host("vh1");

    index.write().apply_reports("gateway", vec![ok(vh.clone())]);
    let _ = updates.try_recv().unwrap();

    index.write().apply_reports("gateway", vec![]);
    assert!(updates.try_recv().is_err());
    assert_eq!(index.read().status(&vh), None);
}
