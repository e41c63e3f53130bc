//! Translator plugin capabilities.
//!
//! A plugin implements [`Plugin`] and opts into any subset of the upstream,
//! route, and function capabilities by returning `Some` from the matching
//! accessor. Callers treat `None` as "not applicable" and move on.

use crate::{
    config::{Config, Route, Upstream, VirtualHost},
    inputs::{EndpointGroups, FileMap, SecretMap},
    resources::{Cluster, RouteConfig},
};
use std::{collections::BTreeSet, sync::Arc};

pub use anyhow::Result;

/// The secrets and files a plugin needs in order to translate a config.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub secret_refs: BTreeSet<String>,
    pub file_refs: BTreeSet<String>,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Declares the inputs this plugin reads for `config`. Upstreams whose
    /// spec can't be decoded contribute nothing here; the error surfaces when
    /// the upstream is translated.
    fn dependencies(&self, _config: &Config) -> Option<Dependencies> {
        None
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        None
    }

    fn as_route(&self) -> Option<&dyn RoutePlugin> {
        None
    }

    fn as_function(&self) -> Option<&dyn FunctionPlugin> {
        None
    }
}

/// Inputs visible to an upstream plugin.
///
/// `secrets` and `files` hold only what the plugin declared in
/// [`Plugin::dependencies`].
#[derive(Copy, Clone, Debug)]
pub struct UpstreamParams<'a> {
    pub secrets: &'a SecretMap,
    pub files: &'a FileMap,
    pub endpoints: &'a EndpointGroups,
}

pub trait UpstreamPlugin: Send + Sync {
    fn process_upstream(
        &self,
        params: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()>;
}

#[derive(Copy, Clone, Debug)]
pub struct RouteParams<'a> {
    pub config: &'a Config,
    pub virtual_host: &'a VirtualHost,
}

pub trait RoutePlugin: Send + Sync {
    fn process_route(&self, params: &RouteParams<'_>, route: &Route, out: &mut RouteConfig)
        -> Result<()>;
}

pub trait FunctionPlugin: UpstreamPlugin {
    /// Converts a function's spec into the metadata the proxy's function
    /// filter consumes.
    ///
    /// `Ok(None)` means the upstream type belongs to another plugin;
    /// `Err` means the type is ours but the spec is invalid.
    fn parse_function_spec(
        &self,
        upstream_type: &str,
        spec: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>>;
}

/// An ordered, explicitly-populated set of plugins.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: Vec<Arc<dyn Plugin>>,
}

// === impl Dependencies ===

impl Dependencies {
    pub fn secrets<I, S>(refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            secret_refs: refs.into_iter().map(|r| r.to_string()).collect(),
            file_refs: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secret_refs.is_empty() && self.file_refs.is_empty()
    }

    /// Restricts `secrets` and `files` to the declared references.
    pub fn scope(&self, secrets: &SecretMap, files: &FileMap) -> (SecretMap, FileMap) {
        let secrets = secrets
            .iter()
            .filter(|(r, _)| self.secret_refs.contains(*r))
            .map(|(r, s)| (r.clone(), s.clone()))
            .collect();
        let files = files
            .iter()
            .filter(|(r, _)| self.file_refs.contains(*r))
            .map(|(r, f)| (r.clone(), f.clone()))
            .collect();
        (secrets, files)
    }
}

// === impl Registry ===

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn register_arc(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> + '_ {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}
