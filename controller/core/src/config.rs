use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point-in-time view of all user configuration.
///
/// Every list is kept sorted by name so that two configs built from the same
/// objects delivered in a different order compare (and hash) equal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub virtual_hosts: Vec<VirtualHost>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// A named backend target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,

    /// Selects the plugin that interprets `spec`.
    #[serde(rename = "type")]
    pub upstream_type: String,

    #[serde(default)]
    pub spec: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Function>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_config: Option<UpstreamSslConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Attached by discovery workers to describe the service behind the
    /// upstream (e.g. which protocol it speaks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_info: Option<ServiceInfo>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub spec: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSslConfig {
    /// Names a secret holding `ca_chain`, and optionally `cert_chain` and
    /// `private_key` for mTLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHost {
    pub name: String,

    /// Empty (or a single blank entry) matches every domain.
    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_config: Option<SslConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    pub secret_ref: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub matcher: Matcher,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_destination: Option<Destination>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multiple_destinations: Vec<WeightedDestination>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,

    /// Free-form settings consumed by route plugins, keyed by plugin.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    #[serde(default)]
    pub path: PathMatch,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathMatch {
    Prefix(String),
    Exact(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Destination {
    #[serde(rename_all = "camelCase")]
    Upstream { name: String },

    #[serde(rename_all = "camelCase")]
    Function {
        upstream_name: String,
        function_name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedDestination {
    pub destination: Destination,
    pub weight: u32,
}

/// A group of proxies that share one served configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<RoleListener>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleListener {
    pub name: String,
    pub bind_address: String,
    pub bind_port: u16,
    #[serde(default)]
    pub ssl: bool,

    /// Names of the virtual hosts served on this listener.
    #[serde(default)]
    pub virtual_hosts: Vec<String>,
}

// === impl Config ===

impl Config {
    pub fn new(
        mut upstreams: Vec<Upstream>,
        mut virtual_hosts: Vec<VirtualHost>,
        mut roles: Vec<Role>,
    ) -> Self {
        upstreams.sort_by(|a, b| a.name.cmp(&b.name));
        for upstream in &mut upstreams {
            upstream.functions.sort_by(|a, b| a.name.cmp(&b.name));
        }
        virtual_hosts.sort_by(|a, b| a.name.cmp(&b.name));
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            upstreams,
            virtual_hosts,
            roles,
        }
    }

    pub fn upstream(&self, name: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.name == name)
    }

    pub fn virtual_host(&self, name: &str) -> Option<&VirtualHost> {
        self.virtual_hosts.iter().find(|vh| vh.name == name)
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }
}

// === impl Upstream ===

impl Upstream {
    pub fn new(name: impl ToString, upstream_type: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            upstream_type: upstream_type.to_string(),
            ..Default::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

// === impl VirtualHost ===

impl VirtualHost {
    /// Returns the domains this host matches, substituting the wildcard when
    /// none are set.
    pub fn effective_domains(&self) -> Vec<String> {
        let blank = self.domains.is_empty()
            || (self.domains.len() == 1 && self.domains[0].trim().is_empty());
        if blank {
            return vec!["*".to_string()];
        }
        self.domains
            .iter()
            .map(|d| {
                if d.trim().is_empty() {
                    "*".to_string()
                } else {
                    d.clone()
                }
            })
            .collect()
    }

    pub fn is_ssl(&self) -> bool {
        self.ssl_config
            .as_ref()
            .map(|ssl| !ssl.secret_ref.is_empty())
            .unwrap_or(false)
    }
}

// === impl Route ===

impl Route {
    pub fn to_upstream(upstream: impl ToString) -> Self {
        Self {
            single_destination: Some(Destination::Upstream {
                name: upstream.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn to_function(upstream: impl ToString, function: impl ToString) -> Self {
        Self {
            single_destination: Some(Destination::Function {
                upstream_name: upstream.to_string(),
                function_name: function.to_string(),
            }),
            ..Default::default()
        }
    }
}

// === impl Matcher ===

impl Default for Matcher {
    fn default() -> Self {
        Self {
            path: PathMatch::default(),
            headers: BTreeMap::new(),
            methods: Vec::new(),
        }
    }
}

impl Default for PathMatch {
    fn default() -> Self {
        Self::Prefix("/".to_string())
    }
}

// === impl Destination ===

impl Destination {
    pub fn upstream_name(&self) -> &str {
        match self {
            Self::Upstream { name } => name,
            Self::Function { upstream_name, .. } => upstream_name,
        }
    }
}
