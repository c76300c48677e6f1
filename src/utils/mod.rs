//! The `utils` module provides a collection of shared definitions used
//! across `brokerlink`.
//!
//! It centralizes the error types returned by the connection manager and
//! the persistence layer, and the logging bootstrap used by the binary.

pub mod error;
pub mod logging;
