use meridian_controller_core::resources::ResourceBundle;
use serde::{Deserialize, Serialize};

/// A proxy's poll for one resource type, in the proxy's REST discovery
/// format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// The version the proxy last applied; empty on first contact.
    #[serde(default)]
    pub version_info: String,
    #[serde(default)]
    pub node: Node,
    #[serde(default)]
    pub resource_names: Vec<String>,
    #[serde(default)]
    pub type_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub version_info: String,
    pub resources: Vec<serde_json::Value>,
    pub type_url: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceType {
    Clusters,
    Endpoints,
    Routes,
    Listeners,
}

// === impl Node ===

impl Node {
    /// The proxy group this node belongs to: the `role` metadata entry when
    /// set, otherwise the node's cluster name.
    pub fn group_key(&self) -> &str {
        self.metadata
            .get("role")
            .and_then(|v| v.as_str())
            .filter(|role| !role.is_empty())
            .unwrap_or(&self.cluster)
    }
}

// === impl ResourceType ===

impl ResourceType {
    /// Parses the final segment of a `/v3/discovery:<type>` path.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.strip_prefix("/v3/discovery:")? {
            "clusters" => Some(Self::Clusters),
            "endpoints" => Some(Self::Endpoints),
            "routes" => Some(Self::Routes),
            "listeners" => Some(Self::Listeners),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clusters => "clusters",
            Self::Endpoints => "endpoints",
            Self::Routes => "routes",
            Self::Listeners => "listeners",
        }
    }

    pub fn type_url(&self) -> &'static str {
        match self {
            Self::Clusters => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            Self::Endpoints => "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment",
            Self::Routes => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
            Self::Listeners => "type.googleapis.com/envoy.config.listener.v3.Listener",
        }
    }

    /// Encodes this type's resources from `bundle`, restricted to `names`
    /// unless it is empty.
    pub fn respond(
        &self,
        bundle: &ResourceBundle,
        names: &[String],
    ) -> serde_json::Result<DiscoveryResponse> {
        let wanted = |name: &str| names.is_empty() || names.iter().any(|n| n == name);
        let resources = match self {
            Self::Clusters => encode(&bundle.clusters, |c| &c.name, wanted)?,
            Self::Endpoints => encode(&bundle.endpoints, |e| &e.cluster_name, wanted)?,
            Self::Routes => encode(&bundle.route_configs, |r| &r.name, wanted)?,
            Self::Listeners => encode(&bundle.listeners, |l| &l.name, wanted)?,
        };
        Ok(DiscoveryResponse {
            version_info: bundle.version.clone(),
            resources,
            type_url: self.type_url().to_string(),
        })
    }
}

fn encode<T: Serialize>(
    items: &[T],
    name: impl Fn(&T) -> &String,
    wanted: impl Fn(&str) -> bool,
) -> serde_json::Result<Vec<serde_json::Value>> {
    items
        .iter()
        .filter(|item| wanted(name(item)))
        .map(serde_json::to_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_controller_core::resources::Cluster;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn group_key_prefers_role_metadata() {
        let node: Node = serde_json::from_value(json!({
            "id": "proxy-1",
            "cluster": "edge",
            "metadata": { "role": "tenant" },
        }))
        .unwrap();
        assert_eq!(node.group_key(), "tenant");

        let node: Node = serde_json::from_value(json!({
            "cluster": "edge",
            "metadata": { "role": "" },
        }))
        .unwrap();
        assert_eq!(node.group_key(), "edge");
    }

    #[test]
    fn respond_filters_by_name() {
        let clusters = ["a", "b"]
            .iter()
            .map(|n| Cluster {
                name: n.to_string(),
                ..Default::default()
            })
            .collect();
        let bundle = ResourceBundle::new(clusters, vec![], vec![], vec![]);

        let all = ResourceType::Clusters.respond(&bundle, &[]).unwrap();
        assert_eq!(all.resources.len(), 2);
        assert_eq!(all.version_info, bundle.version);

        let some = ResourceType::Clusters
            .respond(&bundle, &["b".to_string()])
            .unwrap();
        assert_eq!(some.resources.len(), 1);
        assert_eq!(some.resources[0]["name"], json!("b"));
    }

    #[test]
    fn parses_paths() {
        assert_eq!(
            ResourceType::from_path("/v3/discovery:routes"),
            Some(ResourceType::Routes)
        );
        assert_eq!(ResourceType::from_path("/v3/discovery:secrets"), None);
        assert_eq!(ResourceType::from_path("/snapshots"), None);
    }
}
