//! Remote service implementations
//!
//! - `InMemoryService`: process-local store and bucket
//! - `RestService`: PostgREST table plus object storage over HTTP

pub mod memory;
pub mod rest;

pub use memory::{InMemoryService, StoredObject};
pub use rest::RestService;
