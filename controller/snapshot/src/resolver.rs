//! Determines which secrets and files the registered plugins need.
//!
//! Resolution performs no I/O; its output scopes what the secret and file
//! watchers fetch.

use meridian_controller_core::{
    plugin::{Dependencies, Registry},
    Config,
};
use tracing::trace;

/// Collects the dependencies declared by every plugin for `config`, in
/// registration order. Plugins that declare nothing are skipped.
pub fn resolve(config: &Config, plugins: &Registry) -> Vec<Dependencies> {
    plugins
        .iter()
        .filter_map(|plugin| {
            let deps = plugin.dependencies(config)?;
            trace!(plugin = %plugin.name(), ?deps, "Resolved dependencies");
            Some(deps)
        })
        .collect()
}

/// Unions a set of dependencies.
pub fn merge(deps: &[Dependencies]) -> Dependencies {
    deps.iter().fold(Dependencies::default(), |mut acc, d| {
        acc.secret_refs.extend(d.secret_refs.iter().cloned());
        acc.file_refs.extend(d.file_refs.iter().cloned());
        acc
    })
}
