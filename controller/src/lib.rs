//! The Meridian controller: translates declarative routing configuration into
//! proxy resources and serves them to proxies grouped by role.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use meridian_controller_runtime::{
    core, snapshot, status, storage, translator, xds, Args, EventLoop,
};
