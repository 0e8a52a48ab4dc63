mod aggregator;
mod capability;
mod consumer;
mod distributor;
mod feed;
mod maintenance;
mod orchestrator;
mod processor;
mod threshold;

pub use aggregator::AggregatorError;
pub use capability::CapabilityError;
pub use consumer::ConsumerError;
pub use distributor::DistributorError;
pub use feed::FeedError;
pub use maintenance::MaintenanceError;
pub use orchestrator::OrchestratorError;
pub use processor::ProcessorError;
pub use threshold::ThresholdError;
