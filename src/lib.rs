//! # Granary
//! Durable staging layer for a metrics-aggregation pipeline.
//!
//! Producers append numeric samples into time-bucketed collections; consumer
//! processes periodically scan for buckets whose time window has closed and
//! drain their accumulated values for downstream aggregation. Coordination
//! between consumers happens entirely through a shared Redis instance: bucket
//! keys are hashed into a fixed number of shards, and a leased lock per shard
//! guarantees that exactly one consumer drains a given shard at a time. There
//! is no central coordinator process.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/) and
//!   [redis-rs](https://docs.rs/redis/latest/redis/)
//! - Survive crashed consumers without operator intervention (leases and TTLs
//!   are the only cleanup mechanism)
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use granary::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> granary::Result<()> {
//!     let config = StoreConfig::new("127.0.0.1:6379", 8);
//!     let store = BucketStore::connect(config).await?;
//!
//!     // Producer side: append samples to a window.
//!     let id = Identity::new("requests.latency", Timestamp::now(), Duration::from_secs(60));
//!     let bucket = Bucket::new(id);
//!     bucket.append(&[1.0, 2.5, 9.125]);
//!     store.put(&bucket).await?;
//!
//!     // Consumer side: drain every bucket whose window has closed.
//!     let mut stream = store.scan(Timestamp::now()).await?;
//!     while let Some(bucket) = stream.recv().await {
//!         store.get(&bucket).await?;
//!         // hand bucket.values() to the aggregator
//!     }
//!     let report = stream.finish().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```
//!
//! For tests and local development the store runs against the in-memory
//! [`MemoryBackend`](store::MemoryBackend) instead of Redis; see
//! [`BucketStore::with_backend`](store::BucketStore::with_backend).

#![forbid(unsafe_code)]

pub mod bucket;
pub mod constants;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{Error, Result};

pub mod prelude {
    //! Main export of the store surface.
    //!
    //! Pulls in the bucket model, the store handle, and the supporting
    //! configuration and report types in one `use`.
    pub use crate::bucket::{Bucket, Identity};
    pub use crate::error::{Error, Result};
    pub use crate::store::{BucketStore, ScanReport, ScanStream, StoreConfig};
    pub use crate::types::{ShardId, Timestamp};

    pub use bytes;
}
