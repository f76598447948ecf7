//! Whitelist membership index
//!
//! Built once per policy load from the configured address list. Matching is
//! exact string comparison against the stored entries; reconciling IPv4/IPv6
//! textual variants is the caller's responsibility.

use std::collections::HashSet;

use gatewall_core::PolicyConfig;

#[derive(Debug, Clone, Default)]
pub struct WhitelistIndex {
    addresses: HashSet<String>,
}

impl WhitelistIndex {
    pub fn new<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Build the index for one policy snapshot. A disabled whitelist keeps
    /// the index empty; the engine never consults it in that case.
    pub fn from_config(config: &PolicyConfig) -> Self {
        if !config.whitelist_enabled {
            return Self::default();
        }
        Self::new(config.whitelisted_addresses.iter().cloned())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
