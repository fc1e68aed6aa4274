//! # trackgate-protocol
//!
//! Shared protocol infrastructure for trackgate.
//!
//! This crate provides the services every protocol plugin is built from:
//! - Incremental frame extraction from raw byte streams ([`frame`])
//! - The declarative pattern engine and its typed field cursor
//!   ([`pattern`], [`parser`])
//! - Date/time composition helpers ([`time`])
//! - Checksum and check-digit helpers ([`checksum`])
//! - Device identity resolution and per-connection sessions ([`session`])
//! - The plugin contract itself ([`plugin`])
//!
//! Frame extraction and pattern matching never raise for data-shaped
//! problems; they signal via return values. Only violations of the calling
//! contract (consuming more captured fields than the pattern produced) are
//! allowed to panic.

pub mod bytes;
pub mod checksum;
pub mod frame;
pub mod parser;
pub mod pattern;
pub mod plugin;
pub mod session;
pub mod time;

pub use frame::{
    DelimitedDecoder, Endianness, FrameDecoder, FrameError, FrameLength, LengthPrefixedDecoder,
    MarkerDecoder, StuffedDecoder,
};
pub use parser::{CoordinateFormat, DateTimeFormat, Parser};
pub use pattern::{Pattern, PatternBuilder};
pub use plugin::{ConnectionContext, ProtocolPlugin};
pub use session::{
    ConnectionId, DeviceDirectory, DeviceIdentity, DeviceSessionRegistry, MemoryDeviceDirectory,
};
pub use time::DateTimeBuilder;
