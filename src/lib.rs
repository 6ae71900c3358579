//! Bridge Engine - cross-chain token transfers between a root and a child chain
//!
//! The engine resolves token mappings, estimates fees, submits deposits and
//! withdrawals through an injected signer, tracks their status through the
//! relay service with an on-chain fallback, and drives the exit phase of
//! checkpointed withdrawals.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod metrics;
pub mod relay;
pub mod status;
pub mod token;
pub mod tx;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testutil;

pub use engine::{BridgeEngine, EngineHealth};
pub use error::{BridgeError, BridgeResult};
pub use types::{BridgeDirection, BridgeQuote, BridgeStatus, BridgeToken, BridgeTransaction};
