//! Common event-processing abstractions for the fabric controller.
//!
//! This crate provides the pieces every handler in the controller shares:
//!
//! - [`EventHandler`]: trait implemented by each handler for each event kind
//! - [`KeyedExecutor`]: worker shards that serialise work per key
//! - [`TaskStatus`] / [`TaskStats`]: outcome accounting for dispatched events
//!
//! # Architecture
//!
//! ```text
//! [event source] ──> dispatch() ──hash(key)──> shard N ──> handler.handle(event)
//!                                                 │
//!                                                 └──> TaskStats
//! ```
//!
//! Events with the same key always land on the same shard and therefore run
//! one after another; events with different keys may run in parallel.
//!
//! # Example
//!
//! ```ignore
//! use sr_orch_common::{dispatch, EventHandler, KeyedExecutor, KeyedExecutorConfig, TaskStats};
//!
//! struct PrefixHandler;
//!
//! impl EventHandler<RouteEvent> for PrefixHandler {
//!     type Key = IpPrefix;
//!     type Error = MyError;
//!
//!     fn name(&self) -> &str { "PrefixHandler" }
//!     fn key(&self, event: &RouteEvent) -> IpPrefix { event.prefix() }
//!     fn handle(&self, event: RouteEvent) -> Result<(), MyError> { Ok(()) }
//! }
//!
//! let executor = KeyedExecutor::new(KeyedExecutorConfig::default());
//! dispatch(&executor, &Arc::new(PrefixHandler), event, &Arc::new(TaskStats::default()))?;
//! executor.flush().await;
//! ```

mod executor;
mod handler;
mod task;

pub use executor::{ExecutorError, KeyedExecutor, KeyedExecutorConfig};
pub use handler::{dispatch, EventHandler};
pub use task::{TaskStats, TaskStatsSnapshot, TaskStatus};
