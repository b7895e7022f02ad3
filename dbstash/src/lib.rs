//! dbstash
//!
//! Store and fetch typed values under typed keys without writing SQL at the
//! call site. A key serializer and a value resolver are looked up per call by
//! exact type, and the I/O runs on a small worker pool against one shared
//! connection.

#![forbid(unsafe_code)]

pub mod core;
pub mod memory;
pub mod prelude;
