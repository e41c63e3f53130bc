//! Merges translation reports across roles and writes the resulting status
//! back to the config store.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod metrics;


pub use self::{
    index::{Controller, Index, SharedIndex, Update},
    metrics::{ControllerMetrics, IndexMetrics},
};
