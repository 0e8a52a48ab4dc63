//! Configuration module for the Feed Engine.
//! Reads settings from the environment and wires the pipeline components.
mod dependencies;
pub mod handlers;
pub mod settings;

pub use dependencies::Dependencies;
pub use settings::{ConnectionMode, DatabaseSettings, Settings, StorageBackend};
