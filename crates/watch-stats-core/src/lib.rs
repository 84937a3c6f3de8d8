pub mod aggregator;
pub mod cache;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod gate;
pub mod normalizer;
pub mod partitioner;
pub mod pipeline;
pub mod resolver;
pub mod result_file;
pub mod store;

pub use aggregator::{aggregate, yearly_trends, yearly_watchtime};
pub use cache::{EphemeralCache, InMemoryCache};
pub use codec::{JobData, JobDataCodec};
pub use coordinator::{
    Coordinator, CoordinatorOptions, JobProgress, JobStatusReport, MetricsSnapshot, PriorityResponse, PriorityTrigger,
    ResultResponse, Submission,
};
pub use error::{CacheError, CodecError, CoordinatorError, MalformedRowError, Result, StoreError};
pub use export::{read_export, read_export_file, ViewingExport, EXPECTED_COLUMNS};
pub use gate::{Gate, GateHold};
pub use normalizer::{normalize, Normalized};
pub use partitioner::{discover_units, processing_order, should_process};
pub use pipeline::UnitPipeline;
pub use resolver::{Catalog, Resolution};
pub use result_file::JsonFileResultStore;
pub use store::{CommitOutcome, InMemoryResultStore, ResultStore};
