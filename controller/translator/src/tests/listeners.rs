use super::*;
use maplit::btreemap;
use meridian_controller_core::{
    resources::{DownstreamTlsContext, RouteSpecifier, SocketAddress},
    RoleListener, SslConfig,
};
use pretty_assertions::assert_eq;

fn secure_vhost(name: &str, domains: &[&str]) -> VirtualHost {
    VirtualHost {
        domains: domains.iter().map(|d| d.to_string()).collect(),
        ssl_config: Some(SslConfig {
            secret_ref: format!("{name}-tls"),
        }),
        ..vhost(name, vec![Route::to_upstream("svc-a")])
    }
}

#[test]
fn secure_hosts_terminate_tls_on_the_secure_listener() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![secure_vhost("shop", &["shop.example.com"])],
        [secret(
            "shop-tls",
            &[("ca_chain", "CERT"), ("private_key", "KEY")],
        )]
        .into_iter()
        .collect(),
        endpoints(&["svc-a"]),
    );
    let (bundle, reports) = translate(&snapshot);
    assert!(reports.iter().all(|r| !r.is_err()), "{reports:#?}");

    // The plain listener serves nothing and is omitted.
    assert_eq!(bundle.listeners.len(), 1);
    let listener = &bundle.listeners[0];
    assert_eq!(listener.name, "https");
    assert_eq!(listener.address, SocketAddress::new("::", 8443));
    assert_eq!(listener.filter_chains.len(), 1);

    let chain = &listener.filter_chains[0];
    assert_eq!(chain.server_names, vec!["shop.example.com"]);
    assert_eq!(
        chain.tls_context,
        Some(DownstreamTlsContext {
            cert_chain: "CERT".to_string(),
            private_key: "KEY".to_string(),
        })
    );
    assert_eq!(
        chain.http_connection_manager.route_specifier,
        RouteSpecifier::Rds {
            route_config_name: "https-routes".to_string(),
        }
    );

    let rc = route_config(&bundle, "https-routes");
    assert!(rc.virtual_hosts[0].require_tls);
}

#[test]
fn missing_ssl_secret_is_reported() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![secure_vhost("shop", &[])],
        btreemap! {},
        endpoints(&["svc-a"]),
    );
    let (bundle, reports) = translate(&snapshot);
    assert_eq!(
        errors_for(&reports, ResourceKind::VirtualHost, "shop"),
        vec!["ssl secret not found for ref shop-tls"]
    );
    assert!(bundle.listeners.is_empty());
    assert!(bundle.route_configs.is_empty());
}

#[test]
fn incomplete_ssl_secret_is_reported() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![secure_vhost("shop", &[])],
        [secret("shop-tls", &[("ca_chain", "CERT")])]
            .into_iter()
            .collect(),
        endpoints(&["svc-a"]),
    );
    let (_, reports) = translate(&snapshot);
    let errors = errors_for(&reports, ResourceKind::VirtualHost, "shop");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("private_key"), "{errors:?}");
}

#[test]
fn shared_domains_conflict() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![
            vhost("a", vec![Route::to_upstream("svc-a")]),
            VirtualHost {
                domains: vec![" ".to_string()],
                ..vhost("b", vec![Route::to_upstream("svc-a")])
            },
            VirtualHost {
                domains: vec!["c.example.com".to_string()],
                ..vhost("c", vec![Route::to_upstream("svc-a")])
            },
        ],
        btreemap! {},
        endpoints(&["svc-a"]),
    );
    let (_, reports) = translate(&snapshot);

    let expected = vec!["domain * is shared by the following virtual hosts: a, b"];
    assert_eq!(errors_for(&reports, ResourceKind::VirtualHost, "a"), expected);
    assert_eq!(errors_for(&reports, ResourceKind::VirtualHost, "b"), expected);
    assert!(errors_for(&reports, ResourceKind::VirtualHost, "c").is_empty());
}

#[test]
fn custom_role_reports_unknown_hosts() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![vhost("vh1", vec![Route::to_upstream("svc-a")])],
        btreemap! {},
        endpoints(&["svc-a"]),
    );
    let role = Role {
        name: "tenant".to_string(),
        listeners: vec![RoleListener {
            name: "edge".to_string(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 10080,
            ssl: false,
            virtual_hosts: vec!["vh1".to_string(), "gone".to_string()],
        }],
    };
    let (bundle, reports) = Translator::new(&plugins::defaults()).translate(&role, &snapshot);

    assert_eq!(
        errors_for(&reports, ResourceKind::Role, "tenant"),
        vec!["listener edge: virtual host gone not found"]
    );
    assert_eq!(bundle.listeners.len(), 1);
    assert_eq!(bundle.listeners[0].address, SocketAddress::new("0.0.0.0", 10080));
    assert_eq!(routes(&bundle, "edge", "vh1").len(), 1);
}

#[test]
fn plain_host_on_secure_listener_is_reported() {
    let snapshot = snapshot(
        vec![upstream("svc-a")],
        vec![vhost("vh1", vec![Route::to_upstream("svc-a")])],
        btreemap! {},
        endpoints(&["svc-a"]),
    );
    let role = Role {
        name: "tenant".to_string(),
        listeners: vec![RoleListener {
            name: "tls".to_string(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 10443,
            ssl: true,
            virtual_hosts: vec!["vh1".to_string()],
        }],
    };
    let (bundle, reports) = Translator::new(&plugins::defaults()).translate(&role, &snapshot);
    assert_eq!(
        errors_for(&reports, ResourceKind::VirtualHost, "vh1"),
        vec!["virtual host has no ssl config but is bound to secure listener tls"]
    );
    assert!(bundle.listeners.is_empty());
}
