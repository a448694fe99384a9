//! # flowmesh: clustered graph-based workflow execution
//!
//! flowmesh executes directed graphs of typed nodes (start, end, condition,
//! fork, task/"jober", callback) over batches of flow contexts. Instances
//! are advanced node by node, persisted between transitions, coordinated
//! across worker processes through leased distributed locks, retried on
//! transient dispatch failure with compare-and-swap bookkeeping, and
//! dispatched to external executors over an abstract RPC contract.
//!
//! ## Core Concepts
//!
//! - **Flow definition**: the immutable graph describing a workflow
//! - **Flow context**: one running instance's position and data
//! - **Jober**: a task attached to a node, dispatched over RPC
//! - **Lease**: a time-bounded ownership record backing a distributed lock
//! - **Publisher graph**: the live executable form of a definition, cached
//!   per stream so filter state survives between triggers
//!
//! ## Quick Start
//!
//! Build and validate a definition:
//!
//! ```rust
//! use flowmesh::definition::{DefinitionBuilder, FlowEvent};
//! use flowmesh::validation::validate;
//!
//! let definition = DefinitionBuilder::new("hello", "hello1", "1.0.0")
//!     .start_node("start")
//!     .state_node("work", None)
//!     .end_node("end")
//!     .event(FlowEvent::new("ev0001", "start", "work"))
//!     .event(FlowEvent::new("ev0002", "work", "end"))
//!     .build();
//!
//! assert!(validate(&definition).is_ok());
//! ```
//!
//! Execution wires the validated definition to its collaborators (context
//! repository, RPC invoker, condition evaluator, lock manager, retry
//! service) through [`engine::EngineDeps`], activates it through a
//! [`cache::FlowCache`], and offers context batches to the memoized
//! publisher:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn example(cache: flowmesh::cache::FlowCache) -> Result<(), Box<dyn std::error::Error>> {
//! use flowmesh::context::FlowContext;
//!
//! let publisher = cache.get_publisher("hello1-1.0.0").await?;
//! let report = publisher
//!     .offer(vec![FlowContext::new("hello1-1.0.0", "start")])
//!     .await?;
//! assert_eq!(report.completed.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Subsystem error enums carry miette diagnostics. The split matters:
//! validation failures are synchronous and all-or-nothing; jober dispatch
//! failures never reach the trigger caller (they park the context in the
//! retry subsystem); lock contention is a `false`, not an error; a stale
//! retry version is a designed zero-rows outcome.
//!
//! ## Module Guide
//!
//! - [`types`] - core enums and the flow-data map type
//! - [`definition`] - the immutable graph model and its builder
//! - [`validation`] - structural rules run at activation
//! - [`context`] - flow context instances and fork branches
//! - [`engine`] - the reactive execution core and its filters
//! - [`lock`] - leased distributed locks with renewal and invalidation
//! - [`retry`] - version-guarded retry records and backoff policy
//! - [`cache`] - definition/publisher memoization
//! - [`stores`] - collaborator traits and in-memory implementations
//! - [`events`] - the engine's observability bus and sinks
//! - [`config`] - engine configuration and env resolution
//! - [`telemetry`] - tracing subscriber bootstrap for embedders

pub mod cache;
pub mod config;
pub mod context;
pub mod definition;
pub mod engine;
pub mod events;
pub mod lock;
pub mod retry;
pub mod stores;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod validation;
