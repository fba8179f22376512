//! `payrun-store` — the remote data store boundary.
//!
//! The store offers no multi-statement transactions: every call fails
//! independently and nothing is assumed atomic. Everything above this crate
//! (saga, scanner, recovery) is built around that assumption.

pub mod audit;
pub mod client;
pub mod memory;

pub use audit::{AuditKind, AuditRecord, AuditStatus};
pub use client::{
    from_document, to_document, Collection, Document, Match, MatchValue, StoreClient, StoreError,
};
pub use memory::InMemoryStore;
