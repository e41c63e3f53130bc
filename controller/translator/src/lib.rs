//! Turns a snapshot into the resources served to one role's proxies.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod function_router;
pub mod plugins;
mod roles;
mod translator;


pub use self::{
    function_router::FunctionRouter,
    roles::{resolve_roles, RoleDefaults},
    translator::Translator,
};
use meridian_controller_core::resources::DiscoveryType;

/// Failures raised by the built-in plugins and structural validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {kind} spec: {source}")]
    InvalidSpec {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("secret {reference} not found")]
    MissingSecret { reference: String },

    #[error("key {key} not found in secret {reference}")]
    MissingSecretKey { reference: String, key: String },

    #[error("cluster type {0:?} specified but hosts were empty")]
    EmptyHosts(DiscoveryType),

    #[error("no plugin could parse function {function} for upstream type {upstream_type}")]
    UnparsedFunction {
        function: String,
        upstream_type: String,
    },
}
