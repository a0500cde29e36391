//! Typed, unsigned transaction request.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Everything the chain collaborator needs to sign and submit a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Sender address.
    pub from: Address,
    /// Destination, the aggregator for batched writes.
    pub to: Address,
    /// Native value attached, in wei.
    pub value: U256,
    /// Encoded call data.
    pub data: Bytes,
    /// Gas limit.
    pub gas_limit: u64,
    /// Sequencing number of the sender.
    pub nonce: u64,
    /// Chain the transaction is valid on.
    pub chain_id: u64,
}

impl TransactionRequest {
    /// Return a copy of this request with a different nonce.
    pub fn with_nonce(self, nonce: u64) -> Self {
        Self { nonce, ..self }
    }
}
