pub mod archive;
pub mod avoid;
pub mod error;
pub mod grouper;
pub mod policy;
pub mod pool;
pub mod processor;
pub mod stats;
pub mod store;
pub mod worker;

pub use archive::ArchiveProcessor;
pub use avoid::AvoidSet;
pub use error::QueueError;
pub use grouper::{Group, Grouper};
pub use policy::{FailureAction, FailurePolicy, RemoveOnFailure, RetainOnFailure};
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use processor::{BatchFile, BatchProcessor, BatchRequest, BatchResponse, FileResult};
pub use stats::{PoolStats, StatsSnapshot};
pub use store::{BufferStore, InMemoryBufferStore};
pub use worker::{CycleOutcome, GroupReport, Worker, WorkerContext};
