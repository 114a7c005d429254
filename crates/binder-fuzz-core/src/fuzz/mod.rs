//! Binder service-call fuzzing framework.
//!
//! Generates randomized `service call` payloads from a transaction catalog,
//! runs them through an external bridge, and classifies each result.
//!
//! # Architecture
//!
//! - [`value_gen`]: Per-slot random token generation
//! - [`counter`]: Run-wide ordering counter for sequence ids
//! - [`bridge`]: Command bridge seam (`adb` in production)
//! - [`executor`]: Validate, generate, invoke, classify and log one transaction
//! - [`runner`]: Worker loop over the catalog
//! - [`pool`]: Worker pool for one run generation
//! - [`report`]: Outcomes, log records and fatal conditions

pub mod bridge;
pub mod counter;
pub mod executor;
pub mod pool;
pub mod report;
pub mod runner;
pub mod value_gen;

pub use bridge::{Bridge, BridgeResponse, CommandBridge, Invocation};
pub use counter::{OrderingCounter, SequenceId};
pub use executor::{
    prepare_call, OutputMarkers, PreparedCall, TransactionExecutor, DEFAULT_INVOCATION_TIMEOUT,
};
pub use pool::{default_worker_count, PoolSettings, WorkerPool};
pub use report::{FatalCondition, LogFormat, LogRecord, Outcome, RecordLog};
pub use runner::{Assignment, Worker, WorkerExit};
pub use value_gen::{InputTag, SlotError, ValueGenerator};
