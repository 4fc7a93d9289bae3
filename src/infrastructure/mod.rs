//! Adapters implementing the domain ports.

pub mod http;
pub mod in_memory;
pub mod json_file;
pub mod platform;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod websocket;
