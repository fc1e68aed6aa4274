//! # trackgate-server
//!
//! TCP ingestion server. One [`TrackerServer`] listens on one port for one
//! protocol plugin; each accepted connection gets its own task that feeds
//! bytes through the plugin's frame decoder, hands frames to the plugin and
//! forwards the resulting position records to a channel sink.

pub mod server;

pub use server::TrackerServer;
