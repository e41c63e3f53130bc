//! Wires the watchers, aggregator, event loop, status writer, and servers
//! into a running controller.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use meridian_controller_core as core;
pub use meridian_controller_snapshot as snapshot;
pub use meridian_controller_status as status;
pub use meridian_controller_storage as storage;
pub use meridian_controller_translator as translator;
pub use meridian_controller_xds as xds;

mod admin;
mod args;
mod event_loop;

pub use self::{
    args::Args,
    event_loop::{EventLoop, EventLoopMetrics},
};
