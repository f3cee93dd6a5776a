//! seqgate - the serving core of a biological-sequence blob gateway.
//!
//! This library implements the processor-dispatch and Cassandra-facing
//! state-machine subsystem of a PubSeq-style gateway: satellite→keyspace
//! schema resolution with atomic snapshot refresh ([`schema`]), cooperative
//! Cassandra task state machines ([`task`]), the racing per-request
//! processor lifecycle ([`processor`]), per-minute statistics rings
//! ([`stats`]) and the named-annotation migration aggregator ([`annot`]).
//!
//! The HTTP surface, the reply chunk encoder and the Cassandra driver
//! itself are external; the driver is reached through the trait seam in
//! [`cassandra`].
//!
//! # High-Level Flow
//!
//! ```ignore
//! use seqgate::processor::{Dispatcher, Registry, WorkerPool};
//! use seqgate::schema::SchemaProvider;
//!
//! let provider = SchemaProvider::new("sat_info", "PSG", bootstrap, factory, resolver);
//! provider.refresh_schema(true)?;
//!
//! let mut registry = Registry::new();
//! registry.register(my_blob_factory)?;
//! let dispatcher = Dispatcher::new(registry.freeze(), WorkerPool::new(workers)?);
//! dispatcher.dispatch(request, reply);
//! ```

pub mod annot;
pub mod blob;
pub mod cassandra;
pub mod config;
pub mod logging;
pub mod processor;
pub mod schema;
pub mod stats;
pub mod task;

/// Version of the seqgate library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
