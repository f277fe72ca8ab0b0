//! # companion-discovery
//!
//! mDNS/Bonjour discovery of Companion-link devices (Apple TV, HomePod).
//!
//! Devices advertise `_companion-link._tcp` with TXT keys describing the
//! model (`rpmd`), accessory id (`rpHA`), and pairing capabilities
//! (`rpFl`/`rpfl`).

pub mod browser;
pub mod parser;

pub use browser::ServiceBrowser;
pub use parser::TxtRecordParser;

/// Service type advertised by Companion-capable devices.
pub const COMPANION_SERVICE_TYPE: &str = "_companion-link._tcp.local.";
