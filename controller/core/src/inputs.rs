use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A decoded secret, keyed by the reference used to fetch it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// An opaque file, keyed by the reference used to fetch it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub contents: Vec<u8>,
}

/// A single discovered endpoint.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

pub type SecretMap = BTreeMap<String, Secret>;

pub type FileMap = BTreeMap<String, File>;

/// Discovered endpoints, keyed by upstream name.
pub type EndpointGroups = BTreeMap<String, Vec<Endpoint>>;

/// Sorts and dedups every group so that equal endpoint sets compare and hash
/// equal regardless of discovery order.
pub fn canonicalize_endpoints(mut groups: EndpointGroups) -> EndpointGroups {
    for endpoints in groups.values_mut() {
        endpoints.sort();
        endpoints.dedup();
    }
    groups
}

// === impl Secret ===

impl Secret {
    pub fn new(reference: impl ToString, data: BTreeMap<String, String>) -> Self {
        Self {
            reference: reference.to_string(),
            data,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

// === impl Endpoint ===

impl Endpoint {
    pub fn new(address: impl ToString, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}
