use super::address_key;

use dashmap::DashMap;
use ethers::types::Address;

/// Bidirectional token address mapping for one chain pair.
///
/// Keys carry the chain the counterpart lives on, so an address present on
/// both chains (the native currency placeholder) maps each way separately.
/// Entries are never evicted. Concurrent writers for the same pair always
/// store the same value, so a lost race is harmless.
#[derive(Debug, Default)]
pub struct TokenMappingCache {
    entries: DashMap<(String, u64), Address>,
}

impl TokenMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counterpart of `address` on `target_chain`, if known
    pub fn get(&self, address: Address, target_chain: u64) -> Option<Address> {
        self.entries
            .get(&(address_key(address), target_chain))
            .map(|e| *e.value())
    }

    /// Record `a` on `a_chain` <-> `b` on `b_chain` in both directions
    pub fn insert_pair(&self, a: Address, a_chain: u64, b: Address, b_chain: u64) {
        self.entries.insert((address_key(a), b_chain), b);
        self.entries.insert((address_key(b), a_chain), a);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
