//! Core types and trait definitions for the Sightline visit tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the domain records, URL canonicalization, the transaction state machine and
//! the storage abstractions; backends and transports build on top of it.

pub mod cache;
pub mod device;
pub mod error;
pub mod ingest;
pub mod link;
pub mod report;
pub mod repository;
pub mod store;
pub mod transaction;
pub mod visit;

pub use error::{Error, Result};
