//! # Feed Engine Pipeline
//! This crate turns queued domain events into feed aggregates and keeps them
//! consistent. It contains the queue consumer, the classifier registry, the
//! aggregator, the threshold detector, the fan-out distributor, the reverse
//! maintainer and reaction rollup, the feed read/write service, and the
//! orchestrator that drives them as a worker pool.
pub mod aggregator;
pub mod capabilities;
pub mod consumer;
pub mod distributor;
pub mod feed;
pub mod maintenance;
pub mod orchestrator;
pub mod processor;
pub mod threshold;

pub mod errors;

mod locks;
