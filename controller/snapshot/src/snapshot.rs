use meridian_controller_core::{
    canonicalize_endpoints, stable_hash, Config, EndpointGroups, FileMap, SecretMap,
};
use serde::Serialize;

/// A point-in-time view of every input the translator reads.
///
/// Snapshots are never modified after construction; the content hash is their
/// identity.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    config: Config,
    secrets: SecretMap,
    files: FileMap,
    endpoints: EndpointGroups,
    #[serde(skip)]
    hash: u64,
}

impl Snapshot {
    pub fn new(
        config: Config,
        secrets: SecretMap,
        files: FileMap,
        endpoints: EndpointGroups,
    ) -> Self {
        let endpoints = canonicalize_endpoints(endpoints);
        let hash = stable_hash(&(&config, &secrets, &files, &endpoints));
        Self {
            config,
            secrets,
            files,
            endpoints,
            hash,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn secrets(&self) -> &SecretMap {
        &self.secrets
    }

    pub fn files(&self) -> &FileMap {
        &self.files
    }

    pub fn endpoints(&self) -> &EndpointGroups {
        &self.endpoints
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}
