use crate::bindings::TransitStateCall;
use crate::chain::ChainPublisher;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip1559::Eip1559TransactionRequest;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use issuer_crypto::{field, Fr};
use issuer_types::{CancellationToken, Identifier, IssuerError, IssuerResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A Groth16-style proof triple as the external prover returns it — already
/// expressed as on-chain `uint256`s, since turning circuit outputs into field
/// elements is the prover's concern, deliberately out of this crate's scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZkProofTriple {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

/// Everything `transitState` needs, already computed by the caller (the
/// `StateEngine`/`Identity` layers own the actual state roots; this crate
/// only broadcasts them).
#[derive(Clone, Copy, Debug)]
pub struct TransitionRequest {
    pub identifier: Identifier,
    pub old_state: Fr,
    pub new_state: Fr,
    pub is_old_state_genesis: bool,
    pub zk_proof: ZkProofTriple,
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn check_cancelled(token: &CancellationToken) -> IssuerResult<()> {
    if token.is_cancelled() {
        Err(IssuerError::Cancelled)
    } else {
        Ok(())
    }
}

fn identifier_to_u256(id: &Identifier) -> U256 {
    let mut buf = [0u8; 32];
    buf[1..32].copy_from_slice(id.as_bytes());
    U256::from_big_endian(&buf)
}

fn fr_to_u256(f: &Fr) -> U256 {
    U256::from_little_endian(&field::to_bytes(f))
}

/// The contract's verifier wants the pairing's `b` coordinate pair swapped
/// relative to how most Groth16 libraries (including the prover this is
/// meant to sit behind) emit it — `[[b0_1,b0_0],[b1_1,b1_0]]`, not
/// `[[b0_0,b0_1],[b1_0,b1_1]]`.
fn swap_b(b: [[U256; 2]; 2]) -> [[U256; 2]; 2] {
    [[b[0][1], b[0][0]], [b[1][1], b[1][0]]]
}

/// Drives the on-chain state transition contract. Holds the chain transport,
/// the contract address, the operator's signing key, and a single-writer
/// mutex — nonce assignment and broadcast must never interleave across two
/// concurrent transitions from the same operator account.
pub struct Publisher {
    chain: Arc<dyn ChainPublisher>,
    contract_address: Address,
    operator: LocalWallet,
    lock: Mutex<()>,
}

impl Publisher {
    pub fn new(chain: Arc<dyn ChainPublisher>, contract_address: Address, operator: LocalWallet) -> Self {
        Self {
            chain,
            contract_address,
            operator,
            lock: Mutex::new(()),
        }
    }

    pub fn operator_address(&self) -> Address {
        self.operator.address()
    }

    /// Assembles, signs, and broadcasts a `transitState` call. Rejects
    /// up front (no chain round-trip at all) when `old_state == new_state`
    /// — publishing a no-op transition is a caller bug, not a retryable
    /// condition. `token` is checked before each chain RPC so a caller that
    /// cancels mid-assembly never ends up broadcasting anyway.
    pub async fn update_state(
        &self,
        transition: TransitionRequest,
        token: CancellationToken,
    ) -> IssuerResult<H256> {
        if transition.old_state == transition.new_state {
            return Err(IssuerError::StateUnchanged);
        }

        let _guard = self.lock.lock().await;

        let calldata: Bytes = TransitStateCall {
            id: identifier_to_u256(&transition.identifier),
            old_state: fr_to_u256(&transition.old_state),
            new_state: fr_to_u256(&transition.new_state),
            is_old_state_genesis: transition.is_old_state_genesis,
            a: transition.zk_proof.a,
            b: swap_b(transition.zk_proof.b),
            c: transition.zk_proof.c,
        }
        .encode()
        .into();

        check_cancelled(&token)?;
        let nonce = self.chain.pending_nonce(self.operator.address()).await?;
        check_cancelled(&token)?;
        let chain_id = self.chain.chain_id().await?;
        check_cancelled(&token)?;
        let base_fee = self.chain.latest_base_fee().await?;
        // round(base_fee * 1.25), matching the fee-bump margin most clients
        // apply so the transition doesn't get stuck behind the next block.
        let base_fee = base_fee * U256::from(5) / U256::from(4);
        check_cancelled(&token)?;
        let tip = self.chain.suggest_tip().await?;
        let max_fee = base_fee + tip;

        let mut request = Eip1559TransactionRequest::new()
            .to(self.contract_address)
            .data(calldata)
            .nonce(nonce)
            .max_priority_fee_per_gas(tip)
            .max_fee_per_gas(max_fee)
            .chain_id(chain_id);

        let unsigned: TypedTransaction = request.clone().into();
        check_cancelled(&token)?;
        let gas = self.chain.estimate_gas(&unsigned).await?;
        request = request.gas(gas);
        let unsigned: TypedTransaction = request.into();

        let signature = self
            .operator
            .sign_transaction(&unsigned)
            .await
            .map_err(|e| IssuerError::ChainIO(e.to_string()))?;
        let raw = unsigned.rlp_signed(&signature);

        check_cancelled(&token)?;
        let tx_hash = self.chain.send_raw_transaction(raw).await?;
        info!(?tx_hash, nonce, "submitted state transition");
        Ok(tx_hash)
    }

    /// Polls for a receipt until it resolves one way or another — fixes the
    /// open bug of a wait that can hang forever. Always returns: `Ok` on a
    /// successful receipt, `Err(ChainIO)` on a reverted transaction or a
    /// terminal RPC error, `Err(Cancelled)` if `token` fires first.
    pub async fn wait(
        &self,
        tx_hash: H256,
        token: CancellationToken,
    ) -> IssuerResult<ethers::types::TransactionReceipt> {
        self.wait_with_interval(tx_hash, token, DEFAULT_POLL_INTERVAL).await
    }

    async fn wait_with_interval(
        &self,
        tx_hash: H256,
        token: CancellationToken,
        poll_interval: Duration,
    ) -> IssuerResult<ethers::types::TransactionReceipt> {
        loop {
            if token.is_cancelled() {
                return Err(IssuerError::Cancelled);
            }

            match self.chain.get_receipt(tx_hash).await? {
                Some(receipt) if receipt.status == Some(U256::from(1)) => return Ok(receipt),
                Some(receipt) => {
                    warn!(?tx_hash, "state transition reverted on chain");
                    return Err(IssuerError::ChainIO(format!(
                        "transaction {tx_hash:?} reverted (status {:?})",
                        receipt.status
                    )));
                }
                None => tokio::time::sleep(poll_interval).await,
            }
        }
    }
}
