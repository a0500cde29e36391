//! Chain node seam.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::Result;

/// A message call to simulate or estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Sender, when the call depends on `msg.sender`.
    pub from: Option<Address>,
    /// Callee.
    pub to: Address,
    /// Native value attached.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

impl CallRequest {
    /// A call to `to` with `data`, no sender and no value.
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            value: U256::ZERO,
            data,
        }
    }

    /// Set the sender.
    pub fn with_sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the attached value.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Operations the engine needs from a chain node.
///
/// None of these are retried by their callers.
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Static call against the latest block. A revert is
    /// [`crate::NodeError::Reverted`] carrying the raw revert bytes.
    async fn call(&self, request: &CallRequest) -> Result<Bytes>;

    /// Gas the call would use if sent as a transaction.
    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64>;

    /// Next sequencing number for `address`, pending transactions included.
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> Result<u64>;

    /// Submit a signed transaction and return its hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// Chain id of the connected network.
    async fn chain_id(&self) -> Result<u64>;
}
