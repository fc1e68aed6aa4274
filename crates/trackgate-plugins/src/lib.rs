//! # trackgate-plugins
//!
//! Protocol plugins. Each module implements one device protocol on top of
//! the shared core services: a frame decoder for its framing discipline,
//! `decode` into canonical position records, and `encode` for the outbound
//! commands the protocol supports.

use std::sync::Arc;
use trackgate_protocol::ProtocolPlugin;

pub mod gps103;
pub mod gt06;
pub mod huabao;
pub mod meiligao;

pub use gps103::Gps103Plugin;
pub use gt06::Gt06Plugin;
pub use huabao::HuabaoPlugin;
pub use meiligao::MeiligaoPlugin;

/// Instantiate a plugin by protocol name.
pub fn create(name: &str) -> Option<Arc<dyn ProtocolPlugin>> {
    match name {
        "gps103" => Some(Arc::new(Gps103Plugin::new())),
        "gt06" => Some(Arc::new(Gt06Plugin::new())),
        "huabao" => Some(Arc::new(HuabaoPlugin::new())),
        "meiligao" => Some(Arc::new(MeiligaoPlugin::new())),
        _ => None,
    }
}

/// Names of all registered protocols.
pub fn available() -> &'static [&'static str] {
    &["gps103", "gt06", "huabao", "meiligao"]
}
