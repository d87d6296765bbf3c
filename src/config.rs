//! Tracer configuration.
//!
//! The process-wide tracer reads its settings from the environment once, on
//! first use:
//! - `MTRACE_BUCKETS`: bucket count of both maps (positive integer, default 7)
//! - `MTRACE_ADDRESS_KEY`: `native` (default) or `truncated32`
//!
//! Invalid values are logged and replaced by the default.

use std::num::NonZeroUsize;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{alloc::AddressKeyFormat, map::DEFAULT_BUCKET_COUNT};

pub const BUCKETS_ENV: &str = "MTRACE_BUCKETS";
pub const ADDRESS_KEY_ENV: &str = "MTRACE_ADDRESS_KEY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Buckets in each of the two maps. Fixed for the tracer's lifetime.
    pub bucket_count: NonZeroUsize,
    pub address_key: AddressKeyFormat,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            address_key: AddressKeyFormat::default(),
        }
    }
}

impl TracerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(BUCKETS_ENV) {
            match raw.trim().parse::<NonZeroUsize>() {
                Ok(n) => config.bucket_count = n,
                Err(_) => warn!("{BUCKETS_ENV}={raw:?} is not a positive integer, using {}", config.bucket_count),
            }
        }
        if let Some(raw) = lookup(ADDRESS_KEY_ENV) {
            match AddressKeyFormat::from_str_loose(&raw) {
                Some(format) => config.address_key = format,
                None => warn!("{ADDRESS_KEY_ENV}={raw:?} is not a known key format, using {:?}", config.address_key),
            }
        }
        config
    }
}
