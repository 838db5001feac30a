//! drift: catalog delta synchronization with resilient batch delivery.
//!
//! This crate keeps a remote search index in step with a periodically
//! regenerated catalog:
//!
//! - Streaming sorted-merge diff between the current catalog export and the
//!   previous run's snapshot (adds, partial updates, deletes)
//! - Byte-budget-aware chunking under the remote payload quota
//! - Multi-host delivery with failover and time-bounded host cool-downs
//! - A bounded resend pass for failed chunks, with run-level accounting
//!
//! # Example
//!
//! ```ignore
//! use drift::{Config, run_all};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), drift::SyncError> {
//!     let config = Config::from_file("drift.yaml")?;
//!     for outcome in run_all(config).await? {
//!         println!("{}: {:?}", outcome.catalog, outcome.result.map(|r| r.records_sent));
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod delivery;
pub mod diff;
pub mod error;
pub mod metrics;
pub mod record;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod sync;
pub mod trace;

// Re-export commonly used items
pub use config::Config;
pub use diff::{ChangeOp, DiffMerger};
pub use error::SyncError;
pub use record::Record;
pub use report::RunReport;
pub use sync::{RunOutcome, run_all, run_all_with_transport, run_catalog};
pub use trace::init_tracing;
