//! Token mapping resolution across the chain pair
//!
//! Lookup order is cache, then the source chain's bridge contract, then the
//! relay service. The contract is authoritative but rate-limited; the relay
//! may lag behind for newly listed tokens.

use super::{address_key, TokenInfoService, TokenMappingCache, NATIVE_TOKEN};
use crate::chain::ChainRegistry;
use crate::config::TokenLimits;
use crate::contracts::{calldata, decode_return, ChildToRootTokenCall, RootToChildTokenCall};
use crate::error::{BridgeError, BridgeResult};
use crate::relay::{RelayApi, TokenPairInfo};
use crate::types::{BridgeDirection, BridgeToken};

use dashmap::DashMap;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves the counterpart of a token on the other chain of the pair
pub struct TokenMappingResolver {
    registry: Arc<ChainRegistry>,
    relay: Arc<dyn RelayApi>,
    info: Arc<TokenInfoService>,
    cache: TokenMappingCache,
    /// Configured limits keyed by root token address
    limits: HashMap<String, TokenLimits>,
    /// Pairs reported by the relay service, keyed by root token address
    relay_pairs: DashMap<String, TokenPairInfo>,
    /// Described tokens, keyed by root token address
    tokens: DashMap<String, BridgeToken>,
}

impl TokenMappingResolver {
    pub fn new(
        registry: Arc<ChainRegistry>,
        relay: Arc<dyn RelayApi>,
        info: Arc<TokenInfoService>,
        limits: HashMap<String, TokenLimits>,
    ) -> Self {
        Self {
            registry,
            relay,
            info,
            cache: TokenMappingCache::new(),
            limits,
            relay_pairs: DashMap::new(),
            tokens: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &TokenMappingCache {
        &self.cache
    }

    /// Address of `token`'s counterpart on the chain paired with `source_chain`
    pub async fn resolve(&self, token: Address, source_chain: u64) -> BridgeResult<Address> {
        let pair = self.registry.pair();
        let direction = pair.direction(source_chain)?;
        let target_chain = pair.counterpart(source_chain)?;

        if let Some(target) = self.cache.get(token, target_chain) {
            crate::metrics::record_mapping_resolution("cache");
            return Ok(target);
        }

        match self.from_contract(token, source_chain, direction).await {
            Ok(Some(target)) => {
                self.cache
                    .insert_pair(token, source_chain, target, target_chain);
                crate::metrics::record_mapping_resolution("contract");
                return Ok(target);
            }
            Ok(None) => debug!("Bridge on chain {} has no mapping for {:?}", source_chain, token),
            Err(e) => warn!(
                "Mapping lookup for {:?} on chain {} failed: {}",
                token, source_chain, e
            ),
        }

        match self.relay.token_mapping(token).await {
            Ok(Some(indexed)) => {
                if let Some(target) = counterpart(&indexed, token, direction) {
                    self.cache
                        .insert_pair(token, source_chain, target, target_chain);
                    self.relay_pairs.insert(address_key(indexed.root_token), indexed);
                    crate::metrics::record_mapping_resolution("relay");
                    return Ok(target);
                }
                warn!(
                    "Relay mapping for {:?} does not match a {} from chain {}",
                    token,
                    direction.name(),
                    source_chain
                );
            }
            Ok(None) => debug!("Relay service has no mapping for {:?}", token),
            Err(e) => warn!("Relay mapping lookup for {:?} failed: {}", token, e),
        }

        Err(BridgeError::NoMappingFound {
            token: format!("{:?}", token),
            chain_id: source_chain,
        })
    }

    async fn from_contract(
        &self,
        token: Address,
        source_chain: u64,
        direction: BridgeDirection,
    ) -> BridgeResult<Option<Address>> {
        let endpoint = self.registry.get(source_chain)?;
        let (data, function) = match direction {
            BridgeDirection::Deposit => (
                calldata(RootToChildTokenCall { root_token: token }),
                "rootToChildToken",
            ),
            BridgeDirection::Withdraw => (
                calldata(ChildToRootTokenCall { child_token: token }),
                "childToRootToken",
            ),
        };

        let raw = endpoint.reader.call(endpoint.bridge_address, data).await?;
        let target: Address = decode_return(function, &raw)?;

        // Unmapped entries read back as the zero address
        Ok((!target.is_zero()).then_some(target))
    }

    /// Full description of the pair `token` belongs to, cached per root address
    pub async fn describe(&self, token: Address, source_chain: u64) -> BridgeResult<BridgeToken> {
        let direction = self.registry.pair().direction(source_chain)?;
        let counterpart = self.resolve(token, source_chain).await?;
        let (root_address, child_address) = match direction {
            BridgeDirection::Deposit => (token, counterpart),
            BridgeDirection::Withdraw => (counterpart, token),
        };

        let key = address_key(root_address);
        if let Some(described) = self.tokens.get(&key) {
            return Ok(described.clone());
        }

        let metadata = self.info.metadata(source_chain, token).await?;
        let configured = self.limits.get(&key);
        let indexed = self.relay_pairs.get(&key).map(|p| p.value().clone());

        let described = BridgeToken {
            symbol: metadata.symbol,
            decimals: metadata.decimals,
            root_address,
            child_address,
            min_amount: configured
                .and_then(|l| l.min_amount)
                .or_else(|| indexed.as_ref().and_then(|p| p.min_amount)),
            max_amount: configured
                .and_then(|l| l.max_amount)
                .or_else(|| indexed.as_ref().and_then(|p| p.max_amount)),
            native: root_address == NATIVE_TOKEN
                || configured.map_or(false, |l| l.native)
                || indexed.as_ref().map_or(false, |p| p.native),
        };

        self.tokens.insert(key, described.clone());
        Ok(described)
    }

    /// Seed the cache with every pair the relay service knows about
    pub async fn warm_up(&self) -> BridgeResult<usize> {
        let chains = self.registry.pair();
        let pairs = self.relay.supported_tokens().await?;
        let count = pairs.len();

        for pair in pairs {
            self.cache.insert_pair(
                pair.root_token,
                chains.root_chain_id,
                pair.child_token,
                chains.child_chain_id,
            );
            self.relay_pairs.insert(address_key(pair.root_token), pair);
        }

        info!("Token mapping cache warmed with {} pairs", count);
        Ok(count)
    }
}

fn counterpart(pair: &TokenPairInfo, token: Address, direction: BridgeDirection) -> Option<Address> {
    match direction {
        BridgeDirection::Deposit if pair.root_token == token => Some(pair.child_token),
        BridgeDirection::Withdraw if pair.child_token == token => Some(pair.root_token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::relay::{MockRelayApi, RelayClient};
    use crate::testutil::{
        registry, usdc_child, usdc_pair, usdc_root, FakeChain, CHILD_CHAIN, ROOT_CHAIN,
    };
    use ethers::types::U256;
    use httpmock::prelude::*;

    fn resolver(
        root: &Arc<FakeChain>,
        child: &Arc<FakeChain>,
        relay: MockRelayApi,
        limits: HashMap<String, TokenLimits>,
    ) -> TokenMappingResolver {
        let registry = Arc::new(registry(root, child, true));
        let info = Arc::new(TokenInfoService::new(registry.clone()));
        TokenMappingResolver::new(registry, Arc::new(relay), info, limits)
    }

    fn usdc_pair_info() -> TokenPairInfo {
        TokenPairInfo {
            root_token: usdc_root(),
            child_token: usdc_child(),
            symbol: Some("USDC".into()),
            decimals: Some(6),
            min_amount: Some(U256::from(1_000u64)),
            max_amount: None,
            native: false,
        }
    }

    #[tokio::test]
    async fn test_mapping_is_symmetric() {
        let (root, child) = usdc_pair();
        let resolver = resolver(&root, &child, MockRelayApi::new(), HashMap::new());

        assert_eq!(resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap(), usdc_child());
        assert_eq!(resolver.resolve(usdc_child(), CHILD_CHAIN).await.unwrap(), usdc_root());
        // The reverse lookup is served from the cache
        assert_eq!(child.calls(), 0);
    }

    fn relay_client(server: &MockServer) -> Arc<dyn RelayApi> {
        let client = RelayClient::new(&RelayConfig {
            base_url: server.base_url(),
            timeout_ms: 1_000,
        })
        .unwrap();
        Arc::new(client)
    }

    fn http_resolver(
        root: &Arc<FakeChain>,
        child: &Arc<FakeChain>,
        relay: Arc<dyn RelayApi>,
    ) -> TokenMappingResolver {
        let registry = Arc::new(registry(root, child, true));
        let info = Arc::new(TokenInfoService::new(registry.clone()));
        TokenMappingResolver::new(registry, relay, info, HashMap::new())
    }

    #[tokio::test]
    async fn test_contract_answer_skips_unindexed_relay() {
        let (root, child) = usdc_pair();
        let server = MockServer::start_async().await;
        let not_indexed = server
            .mock_async(|when, then| {
                when.method(GET).path("/token-mapping");
                then.status(404);
            })
            .await;
        let resolver = http_resolver(&root, &child, relay_client(&server));

        assert_eq!(resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap(), usdc_child());
        assert_eq!(resolver.cache().get(usdc_child(), ROOT_CHAIN), Some(usdc_root()));

        let calls = root.calls();
        resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap();
        assert_eq!(root.calls(), calls);
        not_indexed.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_relay_404_with_unmapped_contract_caches_nothing() {
        let (root, child) = usdc_pair();
        root.unmap_token(usdc_root());
        let server = MockServer::start_async().await;
        let not_indexed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/token-mapping")
                    .query_param("address", format!("{:?}", usdc_root()));
                then.status(404);
            })
            .await;
        let resolver = http_resolver(&root, &child, relay_client(&server));

        let err = resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap_err();

        assert!(matches!(err, BridgeError::NoMappingFound { chain_id: 1, .. }));
        not_indexed.assert_hits_async(1).await;
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_relay_mapping_is_cached() {
        let (root, child) = usdc_pair();
        root.unmap_token(usdc_root());
        let server = MockServer::start_async().await;
        let indexed = server
            .mock_async(|when, then| {
                when.method(GET).path("/token-mapping");
                then.status(200).json_body(serde_json::json!({
                    "rootToken": format!("{:?}", usdc_root()),
                    "childToken": format!("{:?}", usdc_child()),
                }));
            })
            .await;
        let resolver = http_resolver(&root, &child, relay_client(&server));

        assert_eq!(resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap(), usdc_child());
        assert_eq!(resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap(), usdc_child());
        assert_eq!(resolver.resolve(usdc_child(), CHILD_CHAIN).await.unwrap(), usdc_root());

        indexed.assert_hits_async(1).await;
        assert_eq!(child.calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_mapping_respects_direction() {
        let (root, child) = usdc_pair();
        let resolver = resolver(&root, &child, MockRelayApi::new(), HashMap::new());

        resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap();

        assert_eq!(resolver.cache().get(usdc_root(), CHILD_CHAIN), Some(usdc_child()));
        assert!(resolver.cache().get(usdc_root(), ROOT_CHAIN).is_none());
        assert!(resolver.cache().get(usdc_child(), CHILD_CHAIN).is_none());
    }

    #[tokio::test]
    async fn test_relay_fallback_when_contract_unmapped() {
        let (root, child) = usdc_pair();
        root.unmap_token(usdc_root());
        let mut relay = MockRelayApi::new();
        relay
            .expect_token_mapping()
            .times(1)
            .returning(|_| Ok(Some(usdc_pair_info())));
        let resolver = resolver(&root, &child, relay, HashMap::new());

        assert_eq!(resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap(), usdc_child());
        let token = resolver.describe(usdc_root(), ROOT_CHAIN).await.unwrap();
        assert_eq!(token.min_amount, Some(U256::from(1_000u64)));
    }

    #[tokio::test]
    async fn test_all_sources_exhausted_is_no_mapping() {
        let (root, child) = usdc_pair();
        root.set_offline(true);
        let mut relay = MockRelayApi::new();
        relay
            .expect_token_mapping()
            .times(1)
            .returning(|_| Err(BridgeError::RelayUnreachable("timed out".into())));
        let resolver = resolver(&root, &child, relay, HashMap::new());

        let err = resolver.resolve(usdc_root(), ROOT_CHAIN).await.unwrap_err();
        assert!(matches!(err, BridgeError::NoMappingFound { chain_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_describe_uses_configured_limits() {
        let (root, child) = usdc_pair();
        let mut limits = HashMap::new();
        limits.insert(
            address_key(usdc_root()),
            TokenLimits {
                min_amount: Some(U256::from(5u64)),
                max_amount: Some(U256::from(50u64)),
                native: false,
            },
        );
        let resolver = resolver(&root, &child, MockRelayApi::new(), limits);

        let token = resolver.describe(usdc_child(), CHILD_CHAIN).await.unwrap();
        assert_eq!(token.root_address, usdc_root());
        assert_eq!(token.child_address, usdc_child());
        assert_eq!(token.symbol, "USDC");
        assert_eq!(token.max_amount, Some(U256::from(50u64)));
        assert!(!token.native);
    }

    #[tokio::test]
    async fn test_warm_up_seeds_cache() {
        let (root, child) = usdc_pair();
        let mut relay = MockRelayApi::new();
        relay
            .expect_supported_tokens()
            .returning(|| Ok(vec![usdc_pair_info()]));
        let resolver = resolver(&root, &child, relay, HashMap::new());

        assert_eq!(resolver.warm_up().await.unwrap(), 1);
        assert_eq!(resolver.resolve(usdc_child(), CHILD_CHAIN).await.unwrap(), usdc_root());
        assert_eq!(child.calls(), 0);
    }
}
