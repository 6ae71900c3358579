//! ABI call definitions for the bridge and ERC-20 token contracts
//!
//! Both chains expose the same bridge surface; which calls are valid
//! depends on whether the chain is the root (lock) or child (burn) side.

use crate::error::{BridgeError, BridgeResult};

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::{Address, Bytes, U256};

// Bridge contract

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "deposit", abi = "deposit(address,uint256,address)")]
pub struct DepositCall {
    pub token: Address,
    pub amount: U256,
    pub recipient: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "withdraw", abi = "withdraw(address,uint256,address)")]
pub struct WithdrawCall {
    pub token: Address,
    pub amount: U256,
    pub recipient: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "exit", abi = "exit(bytes32,address,uint256)")]
pub struct ExitCall {
    pub transaction_id: [u8; 32],
    pub recipient: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "rootToChildToken", abi = "rootToChildToken(address)")]
pub struct RootToChildTokenCall {
    pub root_token: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "childToRootToken", abi = "childToRootToken(address)")]
pub struct ChildToRootTokenCall {
    pub child_token: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getTransaction", abi = "getTransaction(bytes32)")]
pub struct GetTransactionCall {
    pub transaction_id: [u8; 32],
}

/// Decoded `getTransaction` return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub token: Address,
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
    /// 0 or 1 = pending, 2 = completed, 3 = failed, 4 = canceled
    pub status: u8,
}

impl TransactionRecord {
    /// Absent ids read back as an all-zero record
    pub fn exists(&self) -> bool {
        !self.sender.is_zero()
    }

    pub fn decode_return(data: &[u8]) -> BridgeResult<Self> {
        let (token, sender, recipient, amount, status) =
            <(Address, Address, Address, U256, u8)>::decode(data)
                .map_err(|e| BridgeError::Contract(format!("getTransaction decode: {}", e)))?;
        Ok(Self {
            token,
            sender,
            recipient,
            amount,
            status,
        })
    }

    pub fn encode_return(&self) -> Bytes {
        (self.token, self.sender, self.recipient, self.amount, self.status)
            .encode()
            .into()
    }
}

// ERC-20

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "name", abi = "name()")]
pub struct NameCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "symbol", abi = "symbol()")]
pub struct SymbolCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "decimals", abi = "decimals()")]
pub struct DecimalsCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "totalSupply", abi = "totalSupply()")]
pub struct TotalSupplyCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "balanceOf", abi = "balanceOf(address)")]
pub struct BalanceOfCall {
    pub account: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "allowance", abi = "allowance(address,address)")]
pub struct AllowanceCall {
    pub owner: Address,
    pub spender: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "approve", abi = "approve(address,uint256)")]
pub struct ApproveCall {
    pub spender: Address,
    pub amount: U256,
}

/// ABI-encode a call including its selector
pub fn calldata<C: EthCall + AbiEncode>(call: C) -> Bytes {
    call.encode().into()
}

/// Decode a single return value of a read-only call
pub fn decode_return<T: AbiDecode>(function: &str, data: &[u8]) -> BridgeResult<T> {
    T::decode(data).map_err(|e| BridgeError::Contract(format!("{} decode: {}", function, e)))
}
