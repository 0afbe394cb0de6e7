//! Keyed blob persistence for the QED balloon.
//!
//! The [`Store`] keeps one ordered keyspace per [`Table`] and supports
//! point reads, half-open range scans, last-key lookup, full-table export,
//! and atomic multi-table [`Mutation`] batches. Two backends are provided:
//! a persistent Fjall database and a pure in-memory map, selected at
//! construction time.

mod error;
mod store;

pub use error::StoreError;
pub use store::{Mutation, Store, Table};
