//! In-memory backing store.
//!
//! Useful for tests and as a reference for writing real plugins: a shared
//! table store with fault injection, a provider for it, and a generic
//! JSON-encoding value resolver.

pub mod connection;
pub mod resolver;

pub use connection::{MemoryConnection, MemoryProvider, Operation};
pub use resolver::JsonResolver;
