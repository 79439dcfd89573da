pub mod arguments;
pub mod config;
pub mod credential;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod registry;
pub mod stats;
pub mod traits;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use arguments::JobArguments;
pub use config::TesseraConfig;
pub use credential::{Credential, CredentialPool};
pub use cursor::Cursor;
pub use dispatcher::JobDispatcher;
pub use error::{AppError, DispatchError, ErrorKind};
pub use job::{Job, JobResult, JobType, QueryType};
pub use registry::ProviderRegistry;
pub use stats::{StatKind, StatsCollector, StatsConfig};
pub use traits::{Backend, BackendRequest, Page};
pub use worker::{TracingWorkerReporter, WorkerConfig, WorkerHandle, WorkerService};
