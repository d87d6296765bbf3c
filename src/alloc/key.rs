use std::mem;

use serde::{Deserialize, Serialize};

/// How an address is turned into a key for the per-address map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKeyFormat {
    /// `0x` followed by the full pointer width in zero-padded hex
    #[default]
    Native,
    /// Only the low 32 bits, as `%#X` would print them. On targets with wider
    /// pointers two live allocations can alias onto one key.
    Truncated32,
}

impl AddressKeyFormat {
    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "full" | "wide" => Some(Self::Native),
            "truncated32" | "truncated" | "32" | "u32" => Some(Self::Truncated32),
            _ => None,
        }
    }

    pub fn key(self, address: usize) -> String {
        match self {
            Self::Native => format!(
                "{:#0width$x}",
                address,
                width = 2 + 2 * mem::size_of::<usize>()
            ),
            Self::Truncated32 => format!("{:#X}", address as u32),
        }
    }
}
