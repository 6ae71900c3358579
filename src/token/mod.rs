//! Token module - mapping resolution and ERC-20 reads
//!
//! This module provides:
//! - A bidirectional, append-only mapping cache shared by concurrent callers
//! - Mapping resolution with contract and relay-service fallbacks
//! - Metadata, balance and allowance reads on either chain

mod cache;
mod info;
mod resolver;

pub use cache::TokenMappingCache;
pub use info::{TokenInfoService, TokenMetadata};
pub use resolver::TokenMappingResolver;

use ethers::types::{Address, H160};

/// Placeholder token address standing for the chain's native currency
pub const NATIVE_TOKEN: Address = H160([0u8; 20]);

/// Lower-cased `0x` hex form used as a map key
pub(crate) fn address_key(address: Address) -> String {
    format!("{:?}", address)
}
