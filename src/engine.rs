//! Bridge engine - wires the components for one chain pair
//!
//! The engine owns no background tasks. Polling, relay sweeps and exit
//! prompting are driven by the embedding application.

use crate::chain::{ChainEndpoint, ChainPair, ChainProvider, ChainReader, ChainRegistry, TransactionSigner};
use crate::config::{EngineConfig, Settings, TokenLimits};
use crate::error::{BridgeError, BridgeResult};
use crate::history::BridgeTransactionHistory;
use crate::relay::{RelayApi, RelayClient, RelayCoordinator, SweepReport};
use crate::status::{StatusReport, StatusTracker};
use crate::token::{TokenInfoService, TokenMappingResolver};
use crate::tx::{BridgeRequest, BridgeTransactionInitiator, ExitFlowManager, FeeEstimator, GasEstimator};
use crate::types::{BridgeQuote, BridgeToken, BridgeTransaction};
use crate::validation::{parse_address, to_base_units};

use ethers::types::{Address, H256};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Liveness of the engine's dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub relay: bool,
    pub chains: Vec<(u64, bool)>,
}

impl EngineHealth {
    pub fn is_healthy(&self) -> bool {
        self.relay && self.chains.iter().all(|(_, healthy)| *healthy)
    }
}

/// Cross-chain bridge engine for one root/child pair
pub struct BridgeEngine {
    registry: Arc<ChainRegistry>,
    relay_api: Arc<dyn RelayApi>,
    info: Arc<TokenInfoService>,
    resolver: Arc<TokenMappingResolver>,
    fees: FeeEstimator,
    initiator: BridgeTransactionInitiator,
    relay: RelayCoordinator,
    tracker: Arc<StatusTracker>,
    history: Arc<BridgeTransactionHistory>,
    exits: Option<ExitFlowManager>,
}

impl BridgeEngine {
    /// Create an engine over injected chain endpoints and relay service
    pub fn new(
        registry: ChainRegistry,
        relay_api: Arc<dyn RelayApi>,
        config: EngineConfig,
        token_limits: HashMap<String, TokenLimits>,
    ) -> Self {
        let registry = Arc::new(registry);
        let gas = GasEstimator::new(config.gas_limit_buffer_percent);
        let relay = RelayCoordinator::new(relay_api.clone());

        let info = Arc::new(TokenInfoService::new(registry.clone()));
        let resolver = Arc::new(TokenMappingResolver::new(
            registry.clone(),
            relay_api.clone(),
            info.clone(),
            token_limits,
        ));
        let tracker = Arc::new(StatusTracker::new(registry.clone(), relay_api.clone()));
        let history = Arc::new(BridgeTransactionHistory::new(
            registry.clone(),
            relay_api.clone(),
            resolver.clone(),
            config.history_lookback_blocks,
        ));
        let initiator = BridgeTransactionInitiator::new(
            registry.clone(),
            resolver.clone(),
            info.clone(),
            relay.clone(),
            gas.clone(),
        );
        let exits = registry.pair().checkpointed.then(|| {
            ExitFlowManager::new(
                registry.clone(),
                tracker.clone(),
                history.clone(),
                relay.clone(),
                gas.clone(),
            )
        });

        Self {
            fees: FeeEstimator::new(registry.clone(), config),
            registry,
            relay_api,
            info,
            resolver,
            initiator,
            relay,
            tracker,
            history,
            exits,
        }
    }

    /// Build an engine with RPC providers and the HTTP relay client from settings
    pub fn from_settings(settings: &Settings) -> BridgeResult<Self> {
        let pair = ChainPair {
            root_chain_id: settings.pair.root_chain_id,
            child_chain_id: settings.pair.child_chain_id,
            checkpointed: settings.pair.checkpointed,
        };

        let mut endpoints = Vec::new();
        for chain_id in [pair.root_chain_id, pair.child_chain_id] {
            let chain = settings
                .get_chain_by_id(chain_id)
                .ok_or(BridgeError::ChainNotFound { chain_id })?;
            let bridge_address = Address::from_str(&chain.bridge_address).map_err(|e| {
                BridgeError::Config(format!("bridge address for {}: {}", chain.name, e))
            })?;
            let provider = ChainProvider::new(chain.clone())?;

            info!("Chain {} ({}) initialized successfully", chain.name, chain_id);
            endpoints.push(ChainEndpoint {
                chain_id,
                name: chain.name.clone(),
                bridge_address,
                native_symbol: chain.native_symbol.clone(),
                reader: Arc::new(provider) as Arc<dyn ChainReader>,
            });
        }

        let registry = ChainRegistry::new(pair, endpoints)?;
        let relay = RelayClient::new(&settings.relay)?;
        let limits = settings
            .token_limits()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        Ok(Self::new(
            registry,
            Arc::new(relay),
            settings.engine.clone(),
            limits,
        ))
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn token_info(&self) -> &TokenInfoService {
        &self.info
    }

    pub fn resolver(&self) -> &TokenMappingResolver {
        &self.resolver
    }

    pub fn fees(&self) -> &FeeEstimator {
        &self.fees
    }

    pub fn initiator(&self) -> &BridgeTransactionInitiator {
        &self.initiator
    }

    pub fn relay(&self) -> &RelayCoordinator {
        &self.relay
    }

    pub fn status(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn history(&self) -> &BridgeTransactionHistory {
        &self.history
    }

    /// Exit flow, present only for checkpointed pairs
    pub fn exits(&self) -> Option<&ExitFlowManager> {
        self.exits.as_ref()
    }

    /// Counterpart of a token given as a hex string
    pub async fn resolve(&self, token: &str, source_chain: u64) -> BridgeResult<Address> {
        let token = parse_address(token)?;
        self.resolver.resolve(token, source_chain).await
    }

    pub async fn describe(&self, token: &str, source_chain: u64) -> BridgeResult<BridgeToken> {
        let token = parse_address(token)?;
        self.resolver.describe(token, source_chain).await
    }

    /// Quote a transfer of a human-readable amount
    pub async fn quote(
        &self,
        token: &str,
        amount: &str,
        source_chain: u64,
    ) -> BridgeResult<BridgeQuote> {
        let token = parse_address(token)?;
        crate::validation::check_amount_syntax(amount)?;
        let described = self.resolver.describe(token, source_chain).await?;
        let amount = to_base_units(amount, described.decimals)?;
        described.check_limits(amount)?;
        self.fees.quote(token, amount, source_chain).await
    }

    pub async fn bridge(
        &self,
        request: &BridgeRequest<'_>,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<BridgeTransaction> {
        self.initiator.bridge(request, signer).await
    }

    pub async fn get_status(&self, id: H256, source_chain: u64) -> BridgeResult<StatusReport> {
        self.tracker.get_status(id, source_chain).await
    }

    pub async fn history_of(&self, address: &str) -> BridgeResult<Vec<BridgeTransaction>> {
        self.history.list(parse_address(address)?).await
    }

    /// Transfers involving `address` that have not reached a terminal state
    pub async fn pending_of(&self, address: &str) -> BridgeResult<Vec<BridgeTransaction>> {
        self.history.list_pending(parse_address(address)?).await
    }

    /// Re-request relay for every `PENDING` transfer involving `address`
    pub async fn sweep(&self, address: &str) -> BridgeResult<SweepReport> {
        let pending = self.pending_of(address).await?;
        Ok(self.relay.sweep(&pending).await)
    }

    pub async fn list_exitable(&self, address: &str) -> BridgeResult<Vec<BridgeTransaction>> {
        let address = parse_address(address)?;
        match &self.exits {
            Some(exits) => exits.list_exitable(address).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn exit(
        &self,
        id: H256,
        recipient: &str,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<H256> {
        match &self.exits {
            Some(exits) => exits.exit(id, recipient, signer).await,
            None => Err(BridgeError::NotExitable {
                id: format!("{:?}", id),
                reason: "this bridge pair has no exit phase".into(),
            }),
        }
    }

    /// Check the relay service and every chain
    pub async fn health(&self) -> EngineHealth {
        let (relay, chains) = futures::join!(self.relay_api.health(), self.registry.health_check());
        let relay = match relay {
            Ok(healthy) => healthy,
            Err(e) => {
                error!("Relay health check failed: {}", e);
                false
            }
        };

        EngineHealth { relay, chains }
    }
}
