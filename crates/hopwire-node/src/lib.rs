//! Node-layer primitives and runtime for an on-demand source-routing mesh node.
//!
//! Wires together route discovery/forwarding (`dsr`), hop-by-hop reliability
//! (`pending_ack`), the event-driven scheduler (`event`), proof-of-work gated
//! node admission (`pow`, `admission_ledger`), and the forwarding receipt
//! ledger (`routing_log_ledger`) on top of a pluggable transport.

pub mod admission_ledger;
pub mod config;
pub mod dsr;
pub mod event;
pub mod pending_ack;
pub mod persistence;
pub mod pow;
pub mod route_cache;
pub mod routing_log_ledger;
pub mod runtime;

pub use admission_ledger::{AdmissionError, AdmissionLedger};
pub use config::NodeConfig;
pub use dsr::{DsrError, DsrNode, NodeLink, PacketLogger};
pub use route_cache::RouteCache;
pub use routing_log_ledger::{NodeMetrics, RoutingLogLedger, RoutingLogError};
pub use runtime::NodeRuntime;
