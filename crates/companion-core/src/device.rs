//! Discovered Companion device representation.

use crate::error::CodecError;
use std::net::IpAddr;

/// Pairing capability flags advertised in the `rpFl`/`rpfl` TXT record.
///
/// The value is a hex-encoded bitfield; only the bits relevant to pairing
/// are interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairingFlags(pub u64);

impl PairingFlags {
    const PAIRING_DISABLED: u64 = 0x02;
    const PIN_PAIRING: u64 = 0x200;

    /// Parse from the TXT value, e.g. `"0x627B6"` or `"627B6"`.
    pub fn from_txt_value(value: &str) -> Result<Self, CodecError> {
        let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
        let bits = u64::from_str_radix(trimmed, 16)
            .map_err(|_| CodecError::InvalidFormat(format!("bad pairing flags: {value:?}")))?;
        Ok(Self(bits))
    }

    /// Device refuses new pairings (e.g. "Allow Access" set to people sharing the home).
    pub fn pairing_disabled(&self) -> bool {
        self.0 & Self::PAIRING_DISABLED != 0
    }

    /// Device supports PIN-based pair-setup.
    pub fn supports_pin_pairing(&self) -> bool {
        self.0 & Self::PIN_PAIRING != 0
    }
}

/// A Companion-link device found via mDNS.
#[derive(Debug, Clone)]
pub struct CompanionDevice {
    /// Service instance name (usually the device's display name).
    pub name: String,
    /// All addresses the service resolved to.
    pub addresses: Vec<IpAddr>,
    /// TCP port of the companion service.
    pub port: u16,
    /// Model identifier from `rpmd` (e.g. "AppleTV6,2").
    pub model: Option<String>,
    /// Accessory identifier from `rpHA`.
    pub accessory_id: Option<String>,
    /// Bluetooth address from `rpBA`.
    pub bluetooth_address: Option<String>,
    /// Protocol version from `rpVr`.
    pub protocol_version: Option<String>,
    /// Pairing flags from `rpFl` (or legacy `rpfl`).
    pub flags: PairingFlags,
}

impl CompanionDevice {
    /// Pick the address to connect to, preferring IPv4.
    pub fn best_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }

    /// True if this device can currently be paired with a PIN.
    pub fn is_pairable(&self) -> bool {
        !self.flags.pairing_disabled() && self.flags.supports_pin_pairing()
    }
}
