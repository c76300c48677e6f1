//! # BrokerLink
//!
//! `brokerlink` keeps one authenticated TLS session open to an external
//! message broker, subscribes to a single queue, normalizes every delivery
//! into a JSON document and hands it to a persistence sink. Unexpected
//! disconnects are retried on a timer until the caller disconnects.
//!
//! ## Core Modules
//!
//! - `broker`: connection state machine, reconnect timer and payload normalization.
//! - `config`: layered runtime settings (defaults, file, environment).
//! - `persistence`: append-only message stores (`sled` and in-memory).
//! - `server`: WebSocket control endpoint for connect/disconnect/status/list.
//! - `transport`: adapter traits over the wire-protocol client, plus the AMQP 1.0 adapter.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod config;
pub mod persistence;
pub mod server;
pub mod transport;
pub mod utils;
