//! Storage-side collaborators of the controller.
//!
//! Backends are polled through a small [`ListSource`] interface and every
//! change is delivered to a [`Handler`] together with the full current list,
//! so consumers never maintain their own running view of a backend.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backoff;
pub mod config;
pub mod directory;
pub mod endpoints;
pub mod memory;
pub mod refs;
pub mod store;
pub mod watcher;

pub use self::{
    config::ConfigWatcher,
    directory::{
        DirectoryEndpointSource, DirectoryFileSource, DirectorySecretSource, DirectoryStore,
    },
    endpoints::{EndpointSource, EndpointWatcher},
    memory::MemoryStore,
    refs::{RefSource, RefWatcher},
    store::{
        ensure_secret, update_upstream_with_retry, ConfigStore, SecretStore, SecretUpdate,
        Versioned,
    },
    watcher::{Handler, ListSource, PollingWatcher, RunHandle},
};

use meridian_controller_core::{ResourceKind, Role, Upstream, VirtualHost};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to encode {name}: {message}")]
    Encode { name: String, message: String },

    #[error("{name:?} is not a valid document name")]
    InvalidName { name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: ResourceKind, name: String },

    #[error("gave up updating {kind} {name} after {attempts} attempts")]
    RetriesExhausted {
        kind: ResourceKind,
        name: String,
        attempts: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A named configuration object stored in its own collection.
pub trait Object:
    Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn name(&self) -> &str;
}

impl Object for Upstream {
    const KIND: ResourceKind = ResourceKind::Upstream;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Object for VirtualHost {
    const KIND: ResourceKind = ResourceKind::VirtualHost;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Object for Role {
    const KIND: ResourceKind = ResourceKind::Role;

    fn name(&self) -> &str {
        &self.name
    }
}
