//! Signer session.
//!
//! A [`Session`] owns the sequencing counter of one sending address. The
//! counter is advanced after every accepted submission and refreshed from the
//! chain when the node reports it stale.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use pullfeed_revert::is_sequencing_stale;
use pullfeed_rpc::ChainNode;
use pullfeed_types::TransactionRequest;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::Result;

/// Signs transactions for a session. Key material never enters this crate.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address the signer signs for.
    fn address(&self) -> Address;

    /// Signed, RLP-encoded transaction ready for submission.
    ///
    /// Failures are reported as [`crate::EngineError::Signer`].
    async fn sign(&self, tx: &TransactionRequest) -> Result<Bytes>;
}

/// Sequencing state of one sending address.
#[derive(Debug)]
pub struct Session {
    address: Address,
    chain_id: u64,
    nonce: Mutex<u64>,
}

impl Session {
    /// Session starting at a known nonce.
    pub fn new(address: Address, chain_id: u64, nonce: u64) -> Self {
        Self {
            address,
            chain_id,
            nonce: Mutex::new(nonce),
        }
    }

    /// Session initialized from the chain.
    pub async fn connect(node: &dyn ChainNode, address: Address) -> Result<Self> {
        let chain_id = node.chain_id().await?;
        let nonce = node.transaction_count(address).await?;
        info!(address = %address, chain_id, nonce, "session opened");
        Ok(Self::new(address, chain_id, nonce))
    }

    /// Sending address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Chain id transactions are built for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Current sequencing number.
    pub async fn nonce(&self) -> u64 {
        *self.nonce.lock().await
    }

    /// Reload the sequencing number from the chain.
    pub async fn refresh_nonce(&self, node: &dyn ChainNode) -> Result<u64> {
        let mut nonce = self.nonce.lock().await;
        let fresh = node.transaction_count(self.address).await?;
        warn!(address = %self.address, stale = *nonce, fresh, "sequencing number refreshed");
        *nonce = fresh;
        Ok(fresh)
    }

    /// Sign and submit `tx` with the session's current nonce.
    ///
    /// A stale-nonce rejection refreshes the counter from the chain, re-signs
    /// and submits once more. The counter advances only on acceptance.
    pub async fn execute(
        &self,
        node: &dyn ChainNode,
        tx: TransactionRequest,
        signer: &dyn TransactionSigner,
    ) -> Result<B256> {
        let mut nonce = self.nonce.lock().await;
        let tx = tx.with_nonce(*nonce);
        let raw = signer.sign(&tx).await?;

        let (hash, used) = match node.send_raw_transaction(&raw).await {
            Ok(hash) => (hash, tx.nonce),
            Err(e) if is_sequencing_stale(e.message()) => {
                let fresh = node.transaction_count(self.address).await?;
                warn!(stale = tx.nonce, fresh, "nonce rejected as stale, retrying");
                let tx = tx.with_nonce(fresh);
                let raw = signer.sign(&tx).await?;
                (node.send_raw_transaction(&raw).await?, fresh)
            }
            Err(e) => return Err(e.into()),
        };

        *nonce = used + 1;
        info!(hash = %hash, nonce = used, "transaction submitted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use alloy_primitives::U256;
    use pullfeed_rpc::{CallRequest, NodeError};

    use crate::EngineError;

    /// Node whose pending nonce is `chain_nonce` and which rejects any other.
    struct SequencingNode {
        chain_nonce: AtomicU64,
        sent: AtomicUsize,
    }

    impl SequencingNode {
        fn new(chain_nonce: u64) -> Self {
            Self {
                chain_nonce: AtomicU64::new(chain_nonce),
                sent: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChainNode for SequencingNode {
        async fn call(&self, _request: &CallRequest) -> pullfeed_rpc::Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn estimate_gas(&self, _request: &CallRequest) -> pullfeed_rpc::Result<u64> {
            Ok(21_000)
        }

        async fn transaction_count(&self, _address: Address) -> pullfeed_rpc::Result<u64> {
            Ok(self.chain_nonce.load(Ordering::SeqCst))
        }

        async fn block_timestamp(&self) -> pullfeed_rpc::Result<u64> {
            Ok(1_700_000_000)
        }

        async fn send_raw_transaction(&self, raw: &[u8]) -> pullfeed_rpc::Result<B256> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let nonce = u64::from(raw.first().copied().unwrap_or_default());
            let expected = self.chain_nonce.load(Ordering::SeqCst);
            if nonce < expected {
                return Err(NodeError::Rpc {
                    code: -32000,
                    message: format!("nonce too low: next nonce {expected}, tx nonce {nonce}"),
                });
            }
            self.chain_nonce.store(nonce + 1, Ordering::SeqCst);
            Ok(B256::repeat_byte(raw.first().copied().unwrap_or_default()))
        }

        async fn chain_id(&self) -> pullfeed_rpc::Result<u64> {
            Ok(8453)
        }
    }

    /// Encodes the nonce as the single byte of the "signed" transaction.
    struct NonceByteSigner;

    #[async_trait]
    impl TransactionSigner for NonceByteSigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0x5e)
        }

        async fn sign(&self, tx: &TransactionRequest) -> Result<Bytes> {
            let byte = u8::try_from(tx.nonce).map_err(|e| EngineError::Signer(e.to_string()))?;
            Ok(Bytes::from(vec![byte]))
        }
    }

    fn tx() -> TransactionRequest {
        TransactionRequest {
            from: Address::repeat_byte(0x5e),
            to: Address::repeat_byte(0xca),
            value: U256::ZERO,
            data: Bytes::new(),
            gas_limit: 100_000,
            nonce: 0,
            chain_id: 8453,
        }
    }

    #[tokio::test]
    async fn test_connect_reads_chain_state() {
        let node = SequencingNode::new(12);
        let session = Session::connect(&node, Address::repeat_byte(0x5e))
            .await
            .expect("connect");
        assert_eq!(session.chain_id(), 8453);
        assert_eq!(session.nonce().await, 12);
    }

    #[tokio::test]
    async fn test_execute_advances_nonce() {
        let node = SequencingNode::new(3);
        let session = Session::new(Address::repeat_byte(0x5e), 8453, 3);
        let hash = session
            .execute(&node, tx(), &NonceByteSigner)
            .await
            .expect("execute");
        assert_eq!(hash, B256::repeat_byte(3));
        assert_eq!(session.nonce().await, 4);
        assert_eq!(node.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_refreshes_stale_nonce_once() {
        let node = SequencingNode::new(9);
        let session = Session::new(Address::repeat_byte(0x5e), 8453, 2);
        let hash = session
            .execute(&node, tx(), &NonceByteSigner)
            .await
            .expect("execute after refresh");
        assert_eq!(hash, B256::repeat_byte(9));
        assert_eq!(session.nonce().await, 10);
        assert_eq!(node.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_nonce() {
        let node = SequencingNode::new(40);
        let session = Session::new(Address::repeat_byte(0x5e), 8453, 1);
        assert_eq!(session.refresh_nonce(&node).await.expect("refresh"), 40);
        assert_eq!(session.nonce().await, 40);
    }
}
