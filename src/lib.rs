// ===============================
// src/lib.rs
// ===============================
//
// Async client for the matching engine server.
//
// Delivery contract: events of one kind arrive on their channel in wire
// order. There is no ordering across channels; a consumer selecting over
// several channels may see a trade before an earlier ack.
//
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod pump;
pub mod recorder;
pub mod stats;
pub mod supervisor;
pub mod transport;
pub mod validate;

pub use client::Client;
pub use config::{Config, Framing, ProtocolMode, SymbolFields, TransportKind, WireFormat};
pub use domain::{
    Ack, BookUpdate, CancelAck, CancelOrder, Command, ConnState, Event, NewOrder, ReconnectEvent, Side, Trade,
};
pub use error::{ClientError, ConfigError, DecodeError, TransportError, ValidationError};
pub use pump::ClientChannels;
pub use stats::StatsSnapshot;
