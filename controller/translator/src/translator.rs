use crate::{function_router::FunctionRouter, plugins};
use meridian_controller_core::{
    plugin::{Plugin, Registry, RouteParams, UpstreamParams},
    resources::{
        Cluster, ClusterLoadAssignment, DiscoveryType, DownstreamTlsContext, FilterChain,
        HttpConnectionManager, Listener, ResourceBundle, RouteConfig, RouteConfiguration,
        RouteSpecifier, SocketAddress, VirtualHostConfig,
    },
    Config, Destination, Errors, FileMap, Report, ResourceRef, Role, RoleListener, Route,
    SecretMap, Upstream, VirtualHost, FUNCTION_ROUTER_FILTER,
};
use meridian_controller_snapshot::Snapshot;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const ROUTER_FILTER: &str = "router";

/// Secret keys holding a secure virtual host's certificate chain and key.
pub const SSL_CERT_CHAIN_KEY: &str = "ca_chain";
pub const SSL_PRIVATE_KEY_KEY: &str = "private_key";

/// Converts snapshots into per-role resource bundles.
///
/// Plugins run in a fixed order: the function router, then the core plugins,
/// then the plugins supplied by the caller in registration order.
#[derive(Clone)]
pub struct Translator {
    router: FunctionRouter,
    plugins: Registry,
}

/// The inputs visible to one plugin during a pass.
struct Scoped {
    secrets: SecretMap,
    files: FileMap,
}

// === impl Translator ===

impl Translator {
    pub fn new(extra: &Registry) -> Self {
        let plugins = extra
            .iter()
            .fold(plugins::core(), |reg, p| reg.register_arc(p.clone()));
        let router = FunctionRouter::new(plugins.iter());
        Self { router, plugins }
    }

    /// Every plugin that takes part in translation, for dependency
    /// resolution.
    pub fn registry(&self) -> &Registry {
        &self.plugins
    }

    fn pipeline(&self) -> impl Iterator<Item = &dyn Plugin> + '_ {
        std::iter::once(&self.router as &dyn Plugin).chain(self.plugins.iter().map(|p| &**p))
    }

    /// Translates `snapshot` for the proxies of `role`.
    ///
    /// A report is returned for every upstream, for every virtual host the
    /// role serves, and for the role itself. Resources are emitted even for
    /// objects with errors.
    #[instrument(skip_all, fields(role = %role.name))]
    pub fn translate(&self, role: &Role, snapshot: &Snapshot) -> (ResourceBundle, Vec<Report>) {
        let config = snapshot.config();
        let scoped = self
            .pipeline()
            .map(|plugin| {
                let (secrets, files) = plugin
                    .dependencies(config)
                    .map(|deps| deps.scope(snapshot.secrets(), snapshot.files()))
                    .unwrap_or_default();
                Scoped { secrets, files }
            })
            .collect::<Vec<_>>();

        let mut reports = Vec::new();

        let endpoints = config
            .upstreams
            .iter()
            .filter_map(|u| {
                let endpoints = snapshot.endpoints().get(&u.name)?;
                Some(ClusterLoadAssignment {
                    cluster_name: u.name.clone(),
                    endpoints: endpoints.clone(),
                })
            })
            .collect::<Vec<_>>();

        let mut clusters = Vec::with_capacity(config.upstreams.len());
        for upstream in &config.upstreams {
            let (cluster, errors) = self.translate_upstream(&scoped, snapshot, upstream);
            clusters.push(cluster);
            reports.push(Report::new(ResourceRef::upstream(&upstream.name), errors));
        }

        let mut role_errors = Errors::default();
        let mut hosts = BTreeMap::new();
        for listener in &role.listeners {
            for name in &listener.virtual_hosts {
                match config.virtual_host(name) {
                    Some(vh) => {
                        hosts
                            .entry(vh.name.as_str())
                            .or_insert_with(|| self.translate_virtual_host(config, vh));
                    }
                    None => role_errors.push(format_args!(
                        "listener {}: virtual host {name} not found",
                        listener.name
                    )),
                }
            }
        }

        let mut route_configs = Vec::new();
        let mut listeners = Vec::new();
        for listener in &role.listeners {
            let vhosts = listener
                .virtual_hosts
                .iter()
                .filter_map(|name| config.virtual_host(name))
                .collect::<Vec<_>>();
            for (name, errors) in domain_conflicts(&vhosts) {
                if let Some((_, errs)) = hosts.get_mut(name) {
                    errs.extend(errors);
                }
            }
            if let Some((rc, l)) = build_listener(listener, &vhosts, &mut hosts, snapshot) {
                route_configs.push(rc);
                listeners.push(l);
            }
        }

        reports.extend(
            hosts
                .into_iter()
                .map(|(name, (_, errors))| Report::new(ResourceRef::virtual_host(name), errors)),
        );
        reports.push(Report::new(ResourceRef::role(&role.name), role_errors));

        let bundle = ResourceBundle::new(clusters, endpoints, route_configs, listeners);
        debug!(
            version = %bundle.version,
            clusters = bundle.clusters.len(),
            listeners = bundle.listeners.len(),
            errors = reports.iter().filter(|r| r.is_err()).count(),
            "Translated"
        );
        (bundle, reports)
    }

    fn translate_upstream(
        &self,
        scoped: &[Scoped],
        snapshot: &Snapshot,
        upstream: &Upstream,
    ) -> (Cluster, Errors) {
        let discovery_type = if snapshot.endpoints().contains_key(&upstream.name) {
            DiscoveryType::Eds
        } else {
            DiscoveryType::Static
        };
        let mut cluster = Cluster {
            name: upstream.name.clone(),
            discovery_type,
            connect_timeout_ms: upstream
                .connect_timeout_ms
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ..Default::default()
        };

        let mut errors = Errors::default();
        for (plugin, Scoped { secrets, files }) in self.pipeline().zip(scoped) {
            let Some(processor) = plugin.as_upstream() else {
                continue;
            };
            let params = UpstreamParams {
                secrets,
                files,
                endpoints: snapshot.endpoints(),
            };
            if let Err(error) = processor.process_upstream(&params, upstream, &mut cluster) {
                errors.push(format_args!("{}: {error:#}", plugin.name()));
            }
        }

        if let Err(error) = plugins::validate_cluster(&cluster) {
            errors.push(error);
        }
        (cluster, errors)
    }

    fn translate_virtual_host(
        &self,
        config: &Config,
        vh: &VirtualHost,
    ) -> (VirtualHostConfig, Errors) {
        let params = RouteParams {
            config,
            virtual_host: vh,
        };
        let mut errors = Errors::default();
        let mut routes = Vec::with_capacity(vh.routes.len());
        for (i, route) in vh.routes.iter().enumerate() {
            let invalid = validate_destinations(config, route);
            if !invalid.is_empty() {
                for error in invalid.iter() {
                    errors.push(format_args!("route {i}: {error}"));
                }
                continue;
            }

            let mut out = RouteConfig::default();
            for plugin in self.pipeline() {
                let Some(processor) = plugin.as_route() else {
                    continue;
                };
                if let Err(error) = processor.process_route(&params, route, &mut out) {
                    errors.push(format_args!("route {i}: {}: {error:#}", plugin.name()));
                }
            }
            routes.push(out);
        }

        let vhost = VirtualHostConfig {
            name: vh.name.clone(),
            domains: vh.effective_domains(),
            routes,
            require_tls: vh.is_ssl(),
        };
        (vhost, errors)
    }
}

/// Checks that every destination of `route` names a known upstream and, for
/// function destinations, a function that upstream exposes.
fn validate_destinations(config: &Config, route: &Route) -> Errors {
    let mut errors = Errors::default();
    match (&route.single_destination, route.multiple_destinations.as_slice()) {
        (Some(dst), []) => {
            if let Err(error) = validate_destination(config, dst) {
                errors.push(error);
            }
        }
        (None, weighted) if !weighted.is_empty() => {
            for wd in weighted {
                if let Err(error) = validate_destination(config, &wd.destination) {
                    errors.push(format_args!(
                        "invalid destination in weighted destination list: {error}"
                    ));
                }
            }
        }
        _ => errors.push(
            "must specify either 'single_destination' or 'multiple_destinations' for route",
        ),
    }
    errors
}

fn validate_destination(config: &Config, dst: &Destination) -> Result<(), String> {
    match dst {
        Destination::Upstream { name } => match config.upstream(name) {
            Some(_) => Ok(()),
            None => Err(format!("upstream {name} was not found for upstream destination")),
        },
        Destination::Function {
            upstream_name,
            function_name,
        } => {
            let upstream = config.upstream(upstream_name).ok_or_else(|| {
                format!("upstream {upstream_name} was not found for function destination")
            })?;
            match upstream.function(function_name) {
                Some(_) => Ok(()),
                None => Err(format!(
                    "function {function_name} was not found on upstream {upstream_name}"
                )),
            }
        }
    }
}

/// Finds domains claimed by more than one of `vhosts`. Every host sharing a
/// domain receives an error.
fn domain_conflicts<'v>(vhosts: &[&'v VirtualHost]) -> BTreeMap<&'v str, Errors> {
    let mut owners = BTreeMap::<String, Vec<&'v str>>::new();
    for vh in vhosts {
        let domains = vh.effective_domains().into_iter().collect::<BTreeSet<_>>();
        for domain in domains {
            owners.entry(domain).or_default().push(&vh.name);
        }
    }

    let mut conflicts = BTreeMap::<&'v str, Errors>::new();
    for (domain, names) in owners.into_iter().filter(|(_, n)| n.len() > 1) {
        let shared = names.join(", ");
        for name in names {
            conflicts.entry(name).or_default().push(format_args!(
                "domain {domain} is shared by the following virtual hosts: {shared}"
            ));
        }
    }
    conflicts
}

/// Builds the route configuration and listener for one role listener, or
/// `None` when it would serve no virtual hosts.
///
/// Secure listeners carry one filter chain per virtual host, terminating TLS
/// with the certificate from the host's secret.
fn build_listener(
    listener: &RoleListener,
    vhosts: &[&VirtualHost],
    hosts: &mut BTreeMap<&str, (VirtualHostConfig, Errors)>,
    snapshot: &Snapshot,
) -> Option<(RouteConfiguration, Listener)> {
    let route_config_name = format!("{}-routes", listener.name);
    let connection_manager = HttpConnectionManager {
        stat_prefix: listener.name.clone(),
        route_specifier: RouteSpecifier::Rds {
            route_config_name: route_config_name.clone(),
        },
        http_filters: vec![FUNCTION_ROUTER_FILTER.to_string(), ROUTER_FILTER.to_string()],
    };

    let mut served = Vec::new();
    let mut filter_chains = Vec::new();
    for vh in vhosts {
        let Some((config, errors)) = hosts.get_mut(vh.name.as_str()) else {
            continue;
        };
        if !listener.ssl {
            served.push(config.clone());
            continue;
        }

        let Some(ssl) = vh.ssl_config.as_ref().filter(|_| vh.is_ssl()) else {
            errors.push(format_args!(
                "virtual host has no ssl config but is bound to secure listener {}",
                listener.name
            ));
            continue;
        };
        let Some(secret) = snapshot.secrets().get(&ssl.secret_ref) else {
            errors.push(format_args!("ssl secret not found for ref {}", ssl.secret_ref));
            continue;
        };
        let (Some(cert_chain), Some(private_key)) = (
            secret.get(SSL_CERT_CHAIN_KEY),
            secret.get(SSL_PRIVATE_KEY_KEY),
        ) else {
            errors.push(format_args!(
                "keys {SSL_CERT_CHAIN_KEY} and {SSL_PRIVATE_KEY_KEY} must be set in ssl secret {}",
                ssl.secret_ref
            ));
            continue;
        };

        filter_chains.push(FilterChain {
            server_names: config
                .domains
                .iter()
                .filter(|d| *d != "*")
                .cloned()
                .collect(),
            tls_context: Some(DownstreamTlsContext {
                cert_chain: cert_chain.to_string(),
                private_key: private_key.to_string(),
            }),
            http_connection_manager: connection_manager.clone(),
        });
        served.push(config.clone());
    }

    if served.is_empty() {
        return None;
    }
    if !listener.ssl {
        filter_chains.push(FilterChain {
            server_names: vec![],
            tls_context: None,
            http_connection_manager: connection_manager,
        });
    }

    let route_config = RouteConfiguration {
        name: route_config_name,
        virtual_hosts: served,
    };
    let listener = Listener {
        name: listener.name.clone(),
        address: SocketAddress::new(&listener.bind_address, listener.bind_port),
        filter_chains,
    };
    Some((route_config, listener))
}
