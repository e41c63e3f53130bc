//! Proxy-native resources produced by the translator.
//!
//! These mirror the shape of the proxy's cluster, endpoint, route, and
//! listener discovery resources closely enough to be served as JSON.

use crate::{inputs::Endpoint, metadata::Metadata, stable_hash, PathMatch};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    #[default]
    Static,
    StrictDns,
    LogicalDns,
    Eds,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketAddress {
    pub address: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type")]
    pub discovery_type: DiscoveryType,
    pub connect_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<SocketAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<UpstreamTlsContext>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTlsContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHostConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHostConfig {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub require_tls: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(rename = "match")]
    pub route_match: RouteMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RouteAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMatch {
    pub path: PathMatch,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub regex: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteAction {
    Cluster(String),
    WeightedClusters(Vec<WeightedCluster>),
    #[serde(rename_all = "camelCase")]
    DirectResponse {
        status: u16,
        body: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedCluster {
    pub name: String,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub retry_on: String,
    pub num_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub address: SocketAddress,
    pub filter_chains: Vec<FilterChain>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterChain {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_context: Option<DownstreamTlsContext>,
    pub http_connection_manager: HttpConnectionManager,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamTlsContext {
    pub cert_chain: String,
    pub private_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConnectionManager {
    pub stat_prefix: String,
    pub route_specifier: RouteSpecifier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_filters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteSpecifier {
    #[serde(rename_all = "camelCase")]
    Rds { route_config_name: String },
    Inline(RouteConfiguration),
}

/// Everything served to the proxies of one role.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBundle {
    /// A content hash of the remaining fields.
    pub version: String,
    pub clusters: Vec<Cluster>,
    pub endpoints: Vec<ClusterLoadAssignment>,
    pub route_configs: Vec<RouteConfiguration>,
    pub listeners: Vec<Listener>,
}

// === impl SocketAddress ===

impl SocketAddress {
    pub fn new(address: impl ToString, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }
}

// === impl ResourceBundle ===

impl ResourceBundle {
    pub fn new(
        clusters: Vec<Cluster>,
        endpoints: Vec<ClusterLoadAssignment>,
        route_configs: Vec<RouteConfiguration>,
        listeners: Vec<Listener>,
    ) -> Self {
        let version = format!(
            "{:016x}",
            stable_hash(&(&clusters, &endpoints, &route_configs, &listeners))
        );
        Self {
            version,
            clusters,
            endpoints,
            route_configs,
            listeners,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
            && self.endpoints.is_empty()
            && self.route_configs.is_empty()
            && self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_version_tracks_content() {
        let cluster = Cluster {
            name: "svc-a".to_string(),
            discovery_type: DiscoveryType::Eds,
            connect_timeout_ms: 5_000,
            ..Default::default()
        };
        let a = ResourceBundle::new(vec![cluster.clone()], vec![], vec![], vec![]);
        let b = ResourceBundle::new(vec![cluster.clone()], vec![], vec![], vec![]);
        assert_eq!(a.version, b.version);

        let mut changed = cluster;
        changed.connect_timeout_ms = 1_000;
        let c = ResourceBundle::new(vec![changed], vec![], vec![], vec![]);
        assert_ne!(a.version, c.version);
        assert!(ResourceBundle::new(vec![], vec![], vec![], vec![]).is_empty());
    }

    #[test]
    fn discovery_type_wire_names() {
        assert_eq!(
            serde_json::to_value(DiscoveryType::StrictDns).unwrap(),
            serde_json::json!("STRICT_DNS")
        );
    }
}
