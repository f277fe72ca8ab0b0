//! mDNS TXT record parsing for Companion-link services.

use companion_core::device::{CompanionDevice, PairingFlags};
use companion_core::error::CodecError;
use std::collections::HashMap;
use std::net::IpAddr;

/// Parser for `_companion-link._tcp` TXT records.
pub struct TxtRecordParser;

impl TxtRecordParser {
    /// Parse a resolved service into a [`CompanionDevice`].
    pub fn parse_companion_txt(
        name: &str,
        txt: &HashMap<String, String>,
        addresses: Vec<IpAddr>,
        port: u16,
    ) -> Result<CompanionDevice, CodecError> {
        // rpFl is the current key; some firmware still advertises rpfl.
        let flags = txt
            .get("rpFl")
            .or_else(|| txt.get("rpfl"))
            .map(|raw| PairingFlags::from_txt_value(raw))
            .transpose()?
            .unwrap_or_default();

        Ok(CompanionDevice {
            name: name.to_string(),
            addresses,
            port,
            model: txt.get("rpmd").cloned(),
            accessory_id: txt.get("rpHA").cloned(),
            bluetooth_address: txt.get("rpBA").cloned(),
            protocol_version: txt.get("rpVr").cloned(),
            flags,
        })
    }
}
