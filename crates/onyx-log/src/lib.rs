//! A coordination log backend for the Onyx cluster: a durable,
//! totally-ordered replicated log layered on an external coordination
//! service (ZooKeeper-style hierarchical namespace, ephemeral nodes,
//! sequential nodes, watches, and CAS-versioned writes).
//!
//! Peers subscribe to the log (see [`subscriber`]) to drive a deterministic
//! state-replication machine; they also read/write auxiliary immutable
//! chunks ([`chunk`]) and register liveness pulses ([`pulse`]) through the
//! same [`client::Client`].

pub mod chunk;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod gc;
pub mod monitor;
pub mod namespace;
pub mod origin;
pub mod pulse;
pub mod subscriber;
pub mod writer;
pub mod zk;

pub use client::{Backend, Client, ConnectionState, Stat, Watch};
pub use codec::{Codec, ZstdJsonCodec};
pub use config::Config;
pub use connection::Lifecycle;
pub use error::{Error, Result};
pub use monitor::{MonitorEvent, MonitorSink, RecordingSink, TracingSink};
pub use namespace::{pad_sequential_id, Paths};
pub use subscriber::{LogEntry, LogParameters, SubscriberEvent, SUPPORTED_LOG_VERSION};
pub use writer::LogWriter;
pub use zk::ZkBackend;
