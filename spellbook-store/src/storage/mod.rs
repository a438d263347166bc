//! Storage module
//!
//! In-memory handles for binary icon data.

pub mod object_urls;

pub use object_urls::ObjectUrlRegistry;
