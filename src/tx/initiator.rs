//! Bridge transaction submission
//!
//! Validation runs before any network call. After that the steps are
//! strictly ordered: balance, allowance (with a blocking approval when
//! short), the bridge call itself, then a detached relay request.

use super::{submit, GasEstimator};
use crate::chain::{ChainEndpoint, ChainRegistry, TransactionSigner};
use crate::contracts::{calldata, ApproveCall, DepositCall, WithdrawCall};
use crate::error::{BridgeError, BridgeResult};
use crate::events::find_bridge_event;
use crate::relay::RelayCoordinator;
use crate::token::{TokenInfoService, TokenMappingResolver, NATIVE_TOKEN};
use crate::types::{BridgeDirection, BridgeQuote, BridgeTransaction, NewBridgeTransaction};
use crate::validation::{check_amount_syntax, parse_address, to_base_units};

use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// A transfer as requested by the caller
#[derive(Debug, Clone, Copy)]
pub struct BridgeRequest<'a> {
    /// Token address on the source chain
    pub token: &'a str,
    /// Human-readable amount, e.g. `"10"` or `"0.25"`
    pub amount: &'a str,
    pub recipient: &'a str,
    pub source_chain: u64,
    /// Quote the caller accepted, if any; must still be valid
    pub quote: Option<&'a BridgeQuote>,
}

/// Builds and submits deposit and withdraw transactions
pub struct BridgeTransactionInitiator {
    registry: Arc<ChainRegistry>,
    resolver: Arc<TokenMappingResolver>,
    info: Arc<TokenInfoService>,
    relay: RelayCoordinator,
    gas: GasEstimator,
}

impl BridgeTransactionInitiator {
    pub fn new(
        registry: Arc<ChainRegistry>,
        resolver: Arc<TokenMappingResolver>,
        info: Arc<TokenInfoService>,
        relay: RelayCoordinator,
        gas: GasEstimator,
    ) -> Self {
        Self {
            registry,
            resolver,
            info,
            relay,
            gas,
        }
    }

    /// Submit a transfer and return it in `PENDING` state
    pub async fn bridge(
        &self,
        request: &BridgeRequest<'_>,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<BridgeTransaction> {
        let token = parse_address(request.token)?;
        let recipient = parse_address(request.recipient)?;
        check_amount_syntax(request.amount)?;
        if let Some(quote) = request.quote {
            quote.ensure_valid(Utc::now())?;
        }

        let source_chain = request.source_chain;
        if signer.chain_id() != source_chain {
            return Err(BridgeError::Signer(format!(
                "signer is on chain {}, transfer starts on chain {}",
                signer.chain_id(),
                source_chain
            )));
        }

        let (source, target, direction) = self.registry.route(source_chain)?;
        let target_token = self.resolver.resolve(token, source_chain).await?;
        let described = self.resolver.describe(token, source_chain).await?;

        let amount = to_base_units(request.amount, described.decimals)?;
        described.check_limits(amount)?;
        if let Some(quote) = request.quote {
            if quote.token != token || quote.amount != amount || quote.source_chain != source_chain
            {
                return Err(BridgeError::InvalidAmount(
                    "quote was issued for a different transfer".into(),
                ));
            }
        }

        // Native transfers move the chain currency as value, with no approval
        let native = described.native;
        let call_token = if native { NATIVE_TOKEN } else { token };

        let sender = signer.address();
        let balance = self.info.balance_of(source_chain, call_token, sender).await?;
        if balance < amount {
            return Err(BridgeError::InsufficientFunds {
                have: balance.to_string(),
                need: amount.to_string(),
            });
        }

        if !native {
            self.ensure_allowance(source, token, sender, amount, signer)
                .await?;
        }

        let data = match direction {
            BridgeDirection::Deposit => calldata(DepositCall {
                token: call_token,
                amount,
                recipient,
            }),
            BridgeDirection::Withdraw => calldata(WithdrawCall {
                token: call_token,
                amount,
                recipient,
            }),
        };
        let value = if native { amount } else { U256::zero() };

        let tx = self
            .gas
            .prepare(
                source.reader.as_ref(),
                sender,
                source.bridge_address,
                data,
                value,
                None,
            )
            .await?;
        let receipt = submit(signer, tx, direction.name()).await?;

        let event = find_bridge_event(&receipt, direction).map_err(|e| {
            crate::metrics::record_tx_failed(source_chain);
            e
        })?;

        let fee = match (receipt.gas_used, receipt.effective_gas_price) {
            (Some(gas_used), Some(price)) => GasEstimator::calculate_cost(gas_used, price).ok(),
            _ => None,
        };

        let transaction = BridgeTransaction::new(NewBridgeTransaction {
            id: event.transaction_id(),
            source_chain,
            target_chain: target.chain_id,
            source_token: token,
            target_token,
            sender,
            recipient,
            amount: event.amount(),
            source_tx_hash: receipt.transaction_hash,
            fee,
        });

        info!(
            "Submitted {} {} of {} from chain {} to {} (tx {:?})",
            direction.name(),
            transaction.id_hex(),
            described.symbol,
            source_chain,
            target.chain_id,
            receipt.transaction_hash
        );
        crate::metrics::record_tx_submitted(source_chain, direction.name());

        self.relay
            .request_relay_detached(transaction.id(), source_chain);

        Ok(transaction)
    }

    /// Approve the bridge for `amount` if the current allowance is short
    async fn ensure_allowance(
        &self,
        source: &ChainEndpoint,
        token: Address,
        owner: Address,
        amount: U256,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<()> {
        let spender = source.bridge_address;
        let current = self
            .info
            .allowance(source.chain_id, token, owner, spender)
            .await?;
        if current >= amount {
            return Ok(());
        }

        debug!(
            "Allowance {} below {} on chain {}, approving bridge",
            current, amount, source.chain_id
        );
        let tx = self
            .gas
            .prepare(
                source.reader.as_ref(),
                owner,
                token,
                calldata(ApproveCall { spender, amount }),
                U256::zero(),
                None,
            )
            .await?;
        submit(signer, tx, "approve").await?;
        crate::metrics::record_approval(source.chain_id);

        let updated = self
            .info
            .allowance(source.chain_id, token, owner, spender)
            .await?;
        if updated < amount {
            return Err(BridgeError::InsufficientAllowance {
                have: updated.to_string(),
                need: amount.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenLimits;
    use crate::relay::{MockRelayApi, RelayApi};
    use crate::testutil::{
        recipient, registry, usdc_child, usdc_pair, usdc_root, user, CountingRelay, FakeChain,
        FakeSigner, CHILD_CHAIN, GAS_PRICE_WEI, GAS_USED, ROOT_CHAIN,
    };
    use crate::token::address_key;
    use crate::types::{BridgeStatus, FeeEstimate};
    use ethers::abi::AbiDecode;
    use ethers::contract::EthCall;
    use std::collections::HashMap;

    fn initiator(
        root: &Arc<FakeChain>,
        child: &Arc<FakeChain>,
        relay: Arc<dyn RelayApi>,
        limits: HashMap<String, TokenLimits>,
    ) -> BridgeTransactionInitiator {
        let registry = Arc::new(registry(root, child, true));
        let info = Arc::new(TokenInfoService::new(registry.clone()));
        let resolver = Arc::new(TokenMappingResolver::new(
            registry.clone(),
            relay.clone(),
            info.clone(),
            limits,
        ));
        BridgeTransactionInitiator::new(
            registry,
            resolver,
            info,
            RelayCoordinator::new(relay),
            GasEstimator::new(20),
        )
    }

    fn request<'a>(amount: &'a str, recipient: &'a str) -> BridgeRequest<'a> {
        BridgeRequest {
            token: "0xa0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0",
            amount,
            recipient,
            source_chain: ROOT_CHAIN,
            quote: None,
        }
    }

    fn recipient_hex() -> String {
        format!("{:?}", recipient())
    }

    fn funded_pair() -> (Arc<FakeChain>, Arc<FakeChain>) {
        let (root, child) = usdc_pair();
        root.set_balance(usdc_root(), user(), U256::from(100_000_000u64));
        (root, child)
    }

    #[tokio::test]
    async fn test_deposit_with_sufficient_allowance() {
        let (root, child) = funded_pair();
        root.set_allowance(usdc_root(), user(), root.bridge(), U256::MAX);
        let relay = Arc::new(CountingRelay::default());
        let initiator = initiator(&root, &child, relay.clone(), HashMap::new());
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let tx = initiator.bridge(&request("10", &to), &signer).await.unwrap();

        assert_eq!(signer.sent_selectors(), vec![DepositCall::selector()]);
        assert_eq!(tx.amount(), U256::from(10_000_000u64));
        assert_eq!(serde_json::to_value(&tx).unwrap()["amount"], "10000000");
        assert_eq!(tx.status(), BridgeStatus::Pending);
        assert_eq!(tx.target_chain(), CHILD_CHAIN);
        assert_eq!(tx.target_token(), usdc_child());
        assert_eq!(tx.recipient(), recipient());
        assert_eq!(tx.fee(), Some(U256::from(GAS_USED) * U256::from(GAS_PRICE_WEI)));

        for _ in 0..10 {
            if relay.relay_calls() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(relay.relay_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_allowance_approves_first() {
        let (root, child) = funded_pair();
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        initiator.bridge(&request("10", &to), &signer).await.unwrap();

        assert_eq!(
            signer.sent_selectors(),
            vec![ApproveCall::selector(), DepositCall::selector()]
        );
        assert_eq!(signer.sent()[0].to_addr(), Some(&usdc_root()));
    }

    #[tokio::test]
    async fn test_invalid_recipient_makes_no_network_calls() {
        let (root, child) = funded_pair();
        let initiator = initiator(&root, &child, Arc::new(MockRelayApi::new()), HashMap::new());
        let signer = FakeSigner::new(&root, user());

        let err = initiator
            .bridge(&request("10", "0x1234"), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidAddress(_)));
        assert!(err.is_validation());
        assert_eq!(root.calls() + child.calls(), 0);
        assert!(signer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected_before_io() {
        let (root, child) = funded_pair();
        let initiator = initiator(&root, &child, Arc::new(MockRelayApi::new()), HashMap::new());
        let signer = FakeSigner::new(&root, user());
        let to = recipient_hex();

        for amount in ["0", "-1", "abc", "0.000"] {
            let err = initiator
                .bridge(&request(amount, &to), &signer)
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::InvalidAmount(_)), "{}", amount);
        }
        assert_eq!(root.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_quote_rejected_before_io() {
        let (root, child) = funded_pair();
        let initiator = initiator(&root, &child, Arc::new(MockRelayApi::new()), HashMap::new());
        let signer = FakeSigner::new(&root, user());
        let quote = BridgeQuote {
            source_chain: ROOT_CHAIN,
            token: usdc_root(),
            amount: U256::from(10_000_000u64),
            fee: FeeEstimate {
                bridge_fee: U256::zero(),
                relayer_fee: U256::zero(),
                gas_limit: U256::zero(),
                gas_price: U256::zero(),
                gas_estimate: U256::zero(),
                total_fee: U256::zero(),
            },
            expected_received: U256::from(10_000_000u64),
            valid_until: Utc::now() - chrono::Duration::seconds(1),
        };

        let to = recipient_hex();
        let req = BridgeRequest {
            quote: Some(&quote),
            ..request("10", &to)
        };
        let err = initiator.bridge(&req, &signer).await.unwrap_err();

        assert!(matches!(err, BridgeError::QuoteExpired { .. }));
        assert_eq!(root.calls(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_sends_nothing() {
        let (root, child) = usdc_pair();
        root.set_balance(usdc_root(), user(), U256::from(1u64));
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let err = initiator
            .bridge(&request("10", &to), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InsufficientFunds { .. }));
        assert!(signer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_ineffective_approval_is_insufficient_allowance() {
        let (root, child) = funded_pair();
        root.ignore_approvals();
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let err = initiator
            .bridge(&request("10", &to), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InsufficientAllowance { .. }));
        assert_eq!(signer.sent_selectors(), vec![ApproveCall::selector()]);
    }

    #[tokio::test]
    async fn test_reverted_deposit_carries_receipt() {
        let (root, child) = funded_pair();
        root.set_allowance(usdc_root(), user(), root.bridge(), U256::MAX);
        root.revert_next();
        let relay = Arc::new(CountingRelay::default());
        let initiator = initiator(&root, &child, relay.clone(), HashMap::new());
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let err = initiator
            .bridge(&request("10", &to), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::TransactionFailed { .. }));
        assert_eq!(err.receipt().and_then(|r| r.status), Some(0u64.into()));
        assert_eq!(relay.relay_calls(), 0);
    }

    #[tokio::test]
    async fn test_withdraw_from_child_chain() {
        let (root, child) = usdc_pair();
        child.set_balance(usdc_child(), user(), U256::from(5_000_000u64));
        child.set_allowance(usdc_child(), user(), child.bridge(), U256::MAX);
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&child, user());

        let to = recipient_hex();
        let req = BridgeRequest {
            token: "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0",
            source_chain: CHILD_CHAIN,
            ..request("2.5", &to)
        };
        let tx = initiator.bridge(&req, &signer).await.unwrap();

        assert_eq!(signer.sent_selectors(), vec![WithdrawCall::selector()]);
        assert_eq!(tx.amount(), U256::from(2_500_000u64));
        assert_eq!(tx.target_chain(), ROOT_CHAIN);
        assert_eq!(tx.target_token(), usdc_root());
    }

    #[tokio::test]
    async fn test_native_currency_sent_as_value() {
        let (root, child) = usdc_pair();
        let wrapped = Address::repeat_byte(0xee);
        root.map_token(NATIVE_TOKEN, wrapped);
        root.set_native_balance(user(), U256::exp10(19));
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let req = BridgeRequest {
            token: "0x0000000000000000000000000000000000000000",
            ..request("1", &to)
        };
        let tx = initiator.bridge(&req, &signer).await.unwrap();

        assert_eq!(signer.sent_selectors(), vec![DepositCall::selector()]);
        assert_eq!(signer.sent()[0].value(), Some(&U256::exp10(18)));
        assert_eq!(tx.target_token(), wrapped);
    }

    #[tokio::test]
    async fn test_configured_native_token_skips_approval() {
        let (root, child) = usdc_pair();
        let weth = Address::repeat_byte(0xee);
        root.add_token(weth, "Wrapped Ether", "WETH", 18);
        root.map_token(weth, Address::repeat_byte(0xef));
        root.set_native_balance(user(), U256::exp10(19));
        let mut limits = HashMap::new();
        limits.insert(
            address_key(weth),
            TokenLimits {
                native: true,
                ..TokenLimits::default()
            },
        );
        let initiator = initiator(&root, &child, Arc::new(CountingRelay::default()), limits);
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let token = format!("{:?}", weth);
        let req = BridgeRequest {
            token: &token,
            ..request("1", &to)
        };
        let tx = initiator.bridge(&req, &signer).await.unwrap();

        assert_eq!(signer.sent_selectors(), vec![DepositCall::selector()]);
        let sent = signer.sent().remove(0);
        assert_eq!(sent.value(), Some(&U256::exp10(18)));
        let deposit = DepositCall::decode(sent.data().unwrap()).unwrap();
        assert_eq!(deposit.token, NATIVE_TOKEN);
        assert_eq!(tx.source_token(), weth);
        assert_eq!(tx.amount(), U256::exp10(18));
    }

    #[tokio::test]
    async fn test_amount_outside_limits() {
        let (root, child) = funded_pair();
        let mut limits = HashMap::new();
        limits.insert(
            address_key(usdc_root()),
            TokenLimits {
                min_amount: Some(U256::from(20_000_000u64)),
                max_amount: None,
                native: false,
            },
        );
        let initiator = initiator(&root, &child, Arc::new(CountingRelay::default()), limits);
        let signer = FakeSigner::new(&root, user());

        let to = recipient_hex();
        let err = initiator
            .bridge(&request("10", &to), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAmount(_)));
        assert!(signer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_signer_on_wrong_chain() {
        let (root, child) = funded_pair();
        let initiator = initiator(
            &root,
            &child,
            Arc::new(CountingRelay::default()),
            HashMap::new(),
        );
        let signer = FakeSigner::new(&child, user());

        let to = recipient_hex();
        let err = initiator
            .bridge(&request("10", &to), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Signer(_)));
    }
}
