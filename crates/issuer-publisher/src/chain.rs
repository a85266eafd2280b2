use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256};
use issuer_types::{IssuerError, IssuerResult};

/// Chain RPC transport, narrowed to exactly the operations [`Publisher`]
/// needs. The RPC transport itself is deliberately out of this crate's
/// scope — it only consumes one. Kept as a trait so tests can swap in a
/// stub rather than hit a live node.
///
/// [`Publisher`]: crate::publisher::Publisher
#[async_trait]
pub trait ChainPublisher: Send + Sync {
    async fn pending_nonce(&self, address: Address) -> IssuerResult<u64>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> IssuerResult<U256>;
    async fn latest_base_fee(&self) -> IssuerResult<U256>;
    async fn suggest_tip(&self) -> IssuerResult<U256>;
    async fn chain_id(&self) -> IssuerResult<u64>;
    async fn send_raw_transaction(&self, raw: Bytes) -> IssuerResult<H256>;
    async fn get_receipt(&self, tx_hash: H256) -> IssuerResult<Option<TransactionReceipt>>;
}

fn chain_err(e: impl std::fmt::Display) -> IssuerError {
    IssuerError::ChainIO(e.to_string())
}

/// Default [`ChainPublisher`], backed by `ethers`' HTTP JSON-RPC provider.
/// Deliberately holds no signing key — signing is [`Publisher`]'s job, not
/// the transport's.
///
/// [`Publisher`]: crate::publisher::Publisher
pub struct EthersChainPublisher {
    provider: Provider<Http>,
}

impl EthersChainPublisher {
    pub fn new(rpc_url: &str) -> IssuerResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(chain_err)?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainPublisher for EthersChainPublisher {
    async fn pending_nonce(&self, address: Address) -> IssuerResult<u64> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map(|n| n.as_u64())
            .map_err(chain_err)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> IssuerResult<U256> {
        self.provider.estimate_gas(tx, None).await.map_err(chain_err)
    }

    async fn latest_base_fee(&self) -> IssuerResult<U256> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(chain_err)?
            .ok_or_else(|| IssuerError::ChainIO("no latest block returned".into()))?;
        block
            .base_fee_per_gas
            .ok_or_else(|| IssuerError::ChainIO("chain does not report a base fee (pre-EIP-1559?)".into()))
    }

    async fn suggest_tip(&self) -> IssuerResult<U256> {
        self.provider
            .estimate_eip1559_fees(None)
            .await
            .map(|(_, tip)| tip)
            .map_err(chain_err)
    }

    async fn chain_id(&self) -> IssuerResult<u64> {
        self.provider.get_chainid().await.map(|id| id.as_u64()).map_err(chain_err)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> IssuerResult<H256> {
        let pending = self.provider.send_raw_transaction(raw).await.map_err(chain_err)?;
        Ok(pending.tx_hash())
    }

    async fn get_receipt(&self, tx_hash: H256) -> IssuerResult<Option<TransactionReceipt>> {
        self.provider.get_transaction_receipt(tx_hash).await.map_err(chain_err)
    }
}
