//! `#[serde(with = "serde_hex")]` for addresses: written as `"0x..."`
//! strings, read back from such strings or from plain integers.

use std::fmt;

use serde::{de::Visitor, Deserializer, Serializer};

pub fn serialize<S>(value: &usize, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&format_args!("{:#x}", value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    struct V;

    impl<'de> Visitor<'de> for V {
        type Value = usize;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an address as a 0x-prefixed hex string or an integer")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let digits = v
                .strip_prefix("0x")
                .or_else(|| v.strip_prefix("0X"))
                .ok_or_else(|| E::custom(format!("`{v}` has no 0x prefix")))?;
            usize::from_str_radix(digits, 16).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            usize::try_from(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(V)
}
