//! Built-in translator plugins.
//!
//! [`core`] plugins are always installed ahead of any others. [`defaults`]
//! holds the function-capable backends shipped with the controller.

mod extensions;
mod lambda;
mod matcher;
mod rest;
mod service;
mod ssl;

pub use self::{
    extensions::Extensions,
    lambda::{Lambda, UPSTREAM_TYPE as LAMBDA_TYPE},
    matcher::Matcher,
    rest::Rest,
    service::{Service, UPSTREAM_TYPE as SERVICE_TYPE},
    ssl::UpstreamSsl,
};
pub(crate) use self::service::validate_cluster;
use crate::Error;
use meridian_controller_core::plugin::Registry;
use serde::de::DeserializeOwned;

/// Plugins every translation depends on: route matching, route extensions,
/// static services, and upstream TLS.
pub fn core() -> Registry {
    Registry::new()
        .register(Matcher)
        .register(Extensions)
        .register(Service)
        .register(UpstreamSsl)
}

/// The function-capable backends enabled by default.
pub fn defaults() -> Registry {
    Registry::new().register(Rest).register(Lambda)
}

fn decode<T: DeserializeOwned>(kind: &'static str, value: &serde_json::Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|source| Error::InvalidSpec { kind, source })
}
