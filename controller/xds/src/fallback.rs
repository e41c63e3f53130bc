use meridian_controller_core::{
    resources::{
        FilterChain, HttpConnectionManager, Listener, ResourceBundle, RouteAction, RouteConfig,
        RouteConfiguration, RouteSpecifier, SocketAddress, VirtualHostConfig,
    },
    PathMatch,
};

pub const FALLBACK_STATUS: u16 = 500;
pub const FALLBACK_BODY: &str = "Meridian: this proxy's role did not match any configured role. \
Check the role set in the proxy's node metadata or cluster name.";

const FALLBACK_NAME: &str = "fallback";

/// Builds the bundle served to proxies whose role is unknown: a single
/// listener that answers every request with [`FALLBACK_STATUS`].
pub fn fallback_bundle(bind_address: &str, port: u16) -> ResourceBundle {
    let mut route = RouteConfig::default();
    route.route_match.path = PathMatch::Prefix("/".to_string());
    route.action = Some(RouteAction::DirectResponse {
        status: FALLBACK_STATUS,
        body: FALLBACK_BODY.to_string(),
    });

    let listener = Listener {
        name: FALLBACK_NAME.to_string(),
        address: SocketAddress::new(bind_address, port),
        filter_chains: vec![FilterChain {
            server_names: vec![],
            tls_context: None,
            http_connection_manager: HttpConnectionManager {
                stat_prefix: FALLBACK_NAME.to_string(),
                route_specifier: RouteSpecifier::Inline(RouteConfiguration {
                    name: FALLBACK_NAME.to_string(),
                    virtual_hosts: vec![VirtualHostConfig {
                        name: FALLBACK_NAME.to_string(),
                        domains: vec!["*".to_string()],
                        routes: vec![route],
                        require_tls: false,
                    }],
                }),
                http_filters: vec!["router".to_string()],
            },
        }],
    };
    ResourceBundle::new(vec![], vec![], vec![], vec![listener])
}
