//! Meridian control plane core types.
//!
//! This crate models the backend-agnostic configuration that operators write
//! (upstreams, virtual hosts, routes, roles), the ephemeral inputs that are
//! fetched alongside it (secrets, files, discovered endpoints), and the
//! proxy-native resources that the translator produces from them. It also
//! defines the capability traits implemented by translator plugins.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod hash;
pub mod inputs;
pub mod metadata;
pub mod plugin;
pub mod report;
pub mod resources;

pub use self::{
    config::{
        Config, Destination, Function, Matcher, PathMatch, Role, RoleListener, Route, ServiceInfo,
        SslConfig, Upstream, UpstreamSslConfig, VirtualHost, WeightedDestination,
    },
    hash::stable_hash,
    inputs::{canonicalize_endpoints, Endpoint, EndpointGroups, File, FileMap, Secret, SecretMap},
    metadata::Metadata,
    report::{Errors, Report, ResourceKind, ResourceRef, Status, StatusState},
};

/// The name of the role that every proxy falls back to sharing when no other
/// role is configured for it.
pub const DEFAULT_ROLE_NAME: &str = "gateway";

/// Identifies this controller in persisted statuses.
pub const CONTROLLER_NAME: &str = "meridian.io/controller";

/// The filter-metadata namespace read by the proxy's function dispatch filter.
pub const FUNCTION_ROUTER_FILTER: &str = "meridian.function_router";
