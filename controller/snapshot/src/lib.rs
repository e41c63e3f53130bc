//! Aggregates independently watched inputs into immutable snapshots.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod aggregator;
mod metrics;
pub mod resolver;
mod snapshot;

pub use self::{
    aggregator::Aggregator,
    metrics::AggregatorMetrics,
    resolver::resolve,
    snapshot::Snapshot,
};
