//! # trackgate-core
//!
//! Core trackgate data model.
//!
//! This crate provides:
//! - The canonical position record every protocol normalizes into
//! - The typed attribute bag and well-known attribute keys
//! - Outbound command model
//! - Unit conversions to canonical units (knots, meters)
//! - Gateway configuration types
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so it can be reused by offline tooling (replay, test fixtures) as well as
//! the live server.

pub mod config;
pub mod model;
pub mod units;

pub use config::{GatewayConfig, KnownDevice, ProtocolConfig};
pub use model::{keys, AttributeValue, CellTower, Command, Network, PositionRecord};
