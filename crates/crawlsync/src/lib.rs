pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod store;
pub mod stream;

pub use api::{CrawlApi, HttpCrawlApi};
pub use config::{load_config, load_or_default, SyncConfig};
pub use engine::{FetchStatus, SyncEngine};
pub use error::{ConfigError, DecodeError, FetchError, Result, StreamError, SyncError, ValidationError};
pub use record::{normalize, JobId, JobRecord, JobStatus};
pub use store::{AggregateSummary, ConflictPolicy, JobSnapshot, JobStore, StoreChange, UpsertOutcome};
pub use stream::{ConnectionState, ReconnectPolicy, StreamManager};
