use crate::record::ClaimRecord;
use issuer_claim::CoreClaim;
use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_merkle::{Proof, SparseMerkleTree};
use issuer_store::Store;
use issuer_types::{Digest, Identifier, IssuerError, IssuerResult, IDENTIFIER_SIZE};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

const CLAIMS_KEYSPACE: &str = "claims";
const NONCE_INDEX_KEYSPACE: &str = "claims_by_nonce";
const ROOTS_KEYSPACE: &str = "tree/roots";
const IDENTITY_KEYSPACE: &str = "identity";
const NEXT_INDEX_KEY: &[u8] = b"next_index";
const IDENTIFIER_KEY: &[u8] = b"identifier";
const AUTH_CLAIM_ID_KEY: &[u8] = b"auth_claim_id";

/// Owns the three trees that make up an identity's state: Claims
/// (`h_index -> h_value`), Revocations (`revocation_nonce -> version`), and
/// Roots (`sequence index -> historical claims root`).
///
/// `lock` is the engine-wide write lock: every mutating operation takes it
/// for the duration of the mutation, and every operation that must observe
/// the three roots together (`state_hash`, proof generation) takes it as a
/// read lock, so a concurrent `insert_claim` can never be observed
/// half-applied.
pub struct StateEngine {
    store: Arc<dyn Store>,
    lock: RwLock<()>,
    claims: SparseMerkleTree,
    revocations: SparseMerkleTree,
    roots: SparseMerkleTree,
}

impl StateEngine {
    pub fn new(store: Arc<dyn Store>, depth: usize) -> IssuerResult<Self> {
        let claims = SparseMerkleTree::new(store.clone(), "claims", depth)?;
        let revocations = SparseMerkleTree::new(store.clone(), "revocations", depth)?;
        let roots = SparseMerkleTree::new(store.clone(), "roots", depth)?;
        Ok(Self {
            store,
            lock: RwLock::new(()),
            claims,
            revocations,
            roots,
        })
    }

    /// `Poseidon(root_claims, root_revocations, root_roots)`.
    pub fn state_hash(&self) -> IssuerResult<Fr> {
        let _guard = self.lock.read();
        self.state_hash_locked()
    }

    fn state_hash_locked(&self) -> IssuerResult<Fr> {
        let root_claims = self.claims.root()?;
        let root_revocations = self.revocations.root()?;
        let root_roots = self.roots.root()?;
        field::hash(&[root_claims, root_revocations, root_roots])
    }

    pub fn claims_root(&self) -> IssuerResult<Fr> {
        let _guard = self.lock.read();
        self.claims.root()
    }

    pub fn revocations_root(&self) -> IssuerResult<Fr> {
        let _guard = self.lock.read();
        self.revocations.root()
    }

    pub fn roots_root(&self) -> IssuerResult<Fr> {
        let _guard = self.lock.read();
        self.roots.root()
    }

    /// Insert `claim`, persist `record` (with its proof fields filled in),
    /// and append the resulting Claims root to the Roots tree. On any
    /// failure after the Claims tree has already been mutated, prior root
    /// pointers are restored so on-disk and in-memory state agree on the
    /// returned (unchanged) root.
    pub fn insert_claim(&self, claim: &CoreClaim, mut record: ClaimRecord) -> IssuerResult<ClaimRecord> {
        let _guard = self.lock.write();

        let claims_root_before = self.claims.root()?;
        let roots_root_before = self.roots.root()?;
        let next_index_before = self.load_next_index()?;

        match self.try_insert(claim, &mut record, next_index_before) {
            Ok(()) => {
                info!(h_index = %record.h_index_hex, "claim inserted");
                Ok(record)
            }
            Err(err) => {
                warn!(error = %err, "insert_claim failed, rolling back");
                let _ = self.claims.restore_root(claims_root_before);
                let _ = self.roots.restore_root(roots_root_before);
                let _ = self.store_next_index(next_index_before);
                Err(err)
            }
        }
    }

    fn try_insert(&self, claim: &CoreClaim, record: &mut ClaimRecord, next_index: u64) -> IssuerResult<()> {
        let hi = claim.h_index();
        let hv = claim.h_value();
        let hi_hex = hex::encode(field::to_bytes(&hi));

        self.claims.add(hi, hv).map_err(|err| match err {
            IssuerError::KeyExists(_) => IssuerError::Duplicate(hi_hex.clone()),
            other => other,
        })?;

        let claims_root_after = self.claims.root()?;
        self.roots.add(Fr::from(next_index), claims_root_after)?;
        self.store_next_index(next_index + 1)?;

        let inclusion_proof = self.claims.generate_proof(hi)?;
        record.h_index_hex = hi_hex.clone();
        record.inclusion_proof = Some(inclusion_proof.to_bytes());
        record.claims_root_at_issuance = Some(Digest::from_bytes(field::to_bytes(&claims_root_after)));

        let bytes = serde_json::to_vec(record).map_err(|e| IssuerError::Internal(e.to_string()))?;
        self.store.put(CLAIMS_KEYSPACE, hi_hex.as_bytes(), &bytes)?;
        self.store
            .put(NONCE_INDEX_KEYSPACE, &record.revocation_nonce.to_be_bytes(), hi_hex.as_bytes())?;
        self.store.flush()
    }

    /// Insert `nonce -> version` into the Revocations tree, then flip the
    /// matching claim record's `revoked` bookkeeping flag if one was
    /// registered for this nonce at issuance. Fails `AlreadyRevoked` if
    /// `nonce` is already present in the Revocations tree.
    pub fn revoke(&self, nonce: u64, version: u32) -> IssuerResult<()> {
        let _guard = self.lock.write();
        self.revocations
            .add(Fr::from(nonce), Fr::from(version))
            .map_err(|err| match err {
                IssuerError::KeyExists(_) => IssuerError::AlreadyRevoked(nonce.to_string()),
                other => other,
            })?;

        if let Some(h_index_hex) = self.load_nonce_index(nonce)? {
            self.mark_claim_revoked_locked(&h_index_hex)?;
        }

        self.store.flush()
    }

    pub fn get_claim(&self, h_index_hex: &str) -> IssuerResult<ClaimRecord> {
        let _guard = self.lock.read();
        self.get_claim_locked(h_index_hex)
    }

    fn get_claim_locked(&self, h_index_hex: &str) -> IssuerResult<ClaimRecord> {
        let bytes = self
            .store
            .get(CLAIMS_KEYSPACE, h_index_hex.as_bytes())?
            .ok_or_else(|| IssuerError::KeyNotFound(h_index_hex.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| IssuerError::Internal(e.to_string()))
    }

    /// Apply `f` to a previously persisted record and write it back. Used
    /// both for revocation bookkeeping and to backfill the genesis claim's
    /// `issuer` field once the identifier it's derived from is known.
    pub fn update_claim<F: FnOnce(&mut ClaimRecord)>(&self, h_index_hex: &str, f: F) -> IssuerResult<()> {
        let _guard = self.lock.write();
        let mut record = self.get_claim_locked(h_index_hex)?;
        f(&mut record);
        let bytes = serde_json::to_vec(&record).map_err(|e| IssuerError::Internal(e.to_string()))?;
        self.store.put(CLAIMS_KEYSPACE, h_index_hex.as_bytes(), &bytes)?;
        self.store.flush()
    }

    /// Flip a previously persisted record's `revoked` bookkeeping flag.
    /// Assumes the write lock is already held by the caller — revocation
    /// status itself is driven by the Revocations tree mutation in
    /// [`StateEngine::revoke`], which calls this right after.
    fn mark_claim_revoked_locked(&self, h_index_hex: &str) -> IssuerResult<()> {
        let mut record = self.get_claim_locked(h_index_hex)?;
        record.revoked = true;
        let bytes = serde_json::to_vec(&record).map_err(|e| IssuerError::Internal(e.to_string()))?;
        self.store.put(CLAIMS_KEYSPACE, h_index_hex.as_bytes(), &bytes)
    }

    fn load_nonce_index(&self, nonce: u64) -> IssuerResult<Option<String>> {
        match self.store.get(NONCE_INDEX_KEYSPACE, &nonce.to_be_bytes())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|e| IssuerError::Internal(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn revocation_proof(&self, nonce: u64) -> IssuerResult<Proof> {
        let _guard = self.lock.read();
        self.revocations.generate_proof(Fr::from(nonce))
    }

    pub fn inclusion_proof(&self, h_index: Fr) -> IssuerResult<Proof> {
        let _guard = self.lock.read();
        self.claims.generate_proof(h_index)
    }

    /// `next_index` lives alongside the Roots tree's own nodes/root
    /// keyspaces rather than in its own namespace, since it's really just
    /// the tree's append cursor.
    fn load_next_index(&self) -> IssuerResult<u64> {
        match self.store.get(ROOTS_KEYSPACE, NEXT_INDEX_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(arr))
            }
            Some(_) => Err(IssuerError::Internal("corrupt next_index counter".into())),
            None => Ok(0),
        }
    }

    fn store_next_index(&self, value: u64) -> IssuerResult<()> {
        self.store
            .put(ROOTS_KEYSPACE, NEXT_INDEX_KEY, &value.to_be_bytes())
    }

    pub fn persist_identifier(&self, identifier: &Identifier) -> IssuerResult<()> {
        self.store
            .put(IDENTITY_KEYSPACE, IDENTIFIER_KEY, identifier.as_bytes())?;
        self.store.flush()
    }

    pub fn load_identifier(&self) -> IssuerResult<Option<Identifier>> {
        match self.store.get(IDENTITY_KEYSPACE, IDENTIFIER_KEY)? {
            Some(bytes) if bytes.len() == IDENTIFIER_SIZE => {
                let mut arr = [0u8; IDENTIFIER_SIZE];
                arr.copy_from_slice(&bytes);
                Ok(Some(Identifier::from_bytes(arr)))
            }
            Some(_) => Err(IssuerError::Internal("corrupt identifier".into())),
            None => Ok(None),
        }
    }

    pub fn persist_auth_claim_id(&self, h_index_hex: &str) -> IssuerResult<()> {
        self.store
            .put(IDENTITY_KEYSPACE, AUTH_CLAIM_ID_KEY, h_index_hex.as_bytes())?;
        self.store.flush()
    }

    pub fn load_auth_claim_id(&self) -> IssuerResult<Option<String>> {
        match self.store.get(IDENTITY_KEYSPACE, AUTH_CLAIM_ID_KEY)? {
            Some(bytes) => {
                Ok(Some(String::from_utf8(bytes).map_err(|e| {
                    IssuerError::Internal(e.to_string())
                })?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuer_claim::{schema_hash, ClaimInput};
    use issuer_store::SledStore;
    use issuer_types::SubjectPosition;

    fn new_engine() -> StateEngine {
        let store = Arc::new(SledStore::in_memory().unwrap());
        StateEngine::new(store, 16).unwrap()
    }

    fn sample_claim(nonce: u64) -> CoreClaim {
        let input = ClaimInput {
            schema_hash: schema_hash(b"kyc-age", "KYCAgeCredential"),
            expiration: None,
            version: 0,
            revocation_nonce: nonce,
            subject_id: Some(Identifier::from_bytes([0x42; IDENTIFIER_SIZE])),
            subject_position: SubjectPosition::Index,
            data_slots: vec![[1u8; 32]],
        };
        CoreClaim::encode(&input).unwrap()
    }

    fn sample_record(issuer: Identifier) -> ClaimRecord {
        ClaimRecord::pending(
            issuer,
            "ipfs://Qm.../kyc-age.json-ld",
            "KYCAgeCredential",
            vec![],
            "https://issuer.example/api/v1/claims/revocation/status/0",
            0,
            serde_json::json!({"birthday": 19900101}),
            1_700_000_000,
        )
    }

    #[test]
    fn insert_claim_updates_state_hash() {
        let engine = new_engine();
        let before = engine.state_hash().unwrap();
        let claim = sample_claim(7);
        let issuer = Identifier::from_bytes([0x01; IDENTIFIER_SIZE]);
        let record = engine.insert_claim(&claim, sample_record(issuer)).unwrap();
        assert!(record.inclusion_proof.is_some());
        assert_ne!(before, engine.state_hash().unwrap());
    }

    #[test]
    fn duplicate_insert_fails_and_state_hash_unchanged() {
        let engine = new_engine();
        let claim = sample_claim(7);
        let issuer = Identifier::from_bytes([0x01; IDENTIFIER_SIZE]);
        engine.insert_claim(&claim, sample_record(issuer)).unwrap();
        let after_first = engine.state_hash().unwrap();

        let result = engine.insert_claim(&claim, sample_record(issuer));
        assert!(matches!(result, Err(IssuerError::Duplicate(_))));
        assert_eq!(after_first, engine.state_hash().unwrap());
    }

    #[test]
    fn revoke_then_revocation_proof_shows_existence() {
        let engine = new_engine();
        let claim = sample_claim(9);
        let issuer = Identifier::from_bytes([0x01; IDENTIFIER_SIZE]);
        engine.insert_claim(&claim, sample_record(issuer)).unwrap();

        let before_proof = engine.revocation_proof(9).unwrap();
        assert!(!before_proof.existence);

        let state_before = engine.state_hash().unwrap();
        engine.revoke(9, 0).unwrap();
        let state_after = engine.state_hash().unwrap();
        assert_ne!(state_before, state_after);

        let after_proof = engine.revocation_proof(9).unwrap();
        assert!(after_proof.existence);
    }

    #[test]
    fn revoke_marks_the_matching_claim_record_revoked() {
        let engine = new_engine();
        let claim = sample_claim(9);
        let issuer = Identifier::from_bytes([0x01; IDENTIFIER_SIZE]);
        let record = ClaimRecord::pending(
            issuer,
            "ipfs://Qm.../kyc-age.json-ld",
            "KYCAgeCredential",
            vec![],
            "https://issuer.example/api/v1/claims/revocation/status/9",
            9,
            serde_json::json!({"birthday": 19900101}),
            1_700_000_000,
        );
        let inserted = engine.insert_claim(&claim, record).unwrap();
        assert!(!engine.get_claim(&inserted.h_index_hex).unwrap().revoked);

        engine.revoke(9, 0).unwrap();
        assert!(engine.get_claim(&inserted.h_index_hex).unwrap().revoked);
    }

    #[test]
    fn revoke_twice_fails_already_revoked() {
        let engine = new_engine();
        engine.revoke(3, 0).unwrap();
        assert!(matches!(
            engine.revoke(3, 1),
            Err(IssuerError::AlreadyRevoked(_))
        ));
    }

    #[test]
    fn identifier_persists_across_reload() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let engine = StateEngine::new(store.clone(), 16).unwrap();
        assert_eq!(engine.load_identifier().unwrap(), None);

        let id = Identifier::from_bytes([0x09; IDENTIFIER_SIZE]);
        engine.persist_identifier(&id).unwrap();

        let reopened = StateEngine::new(store, 16).unwrap();
        assert_eq!(reopened.load_identifier().unwrap(), Some(id));
    }

    #[test]
    fn concurrent_insertions_all_succeed_and_are_individually_retrievable() {
        use std::thread;

        let store = Arc::new(SledStore::in_memory().unwrap());
        let engine = Arc::new(StateEngine::new(store, 32).unwrap());
        let issuer = Identifier::from_bytes([0x01; IDENTIFIER_SIZE]);
        let state_before = engine.state_hash().unwrap();

        let h_indexes: Vec<String> = thread::scope(|scope| {
            let handles: Vec<_> = (0..10u64)
                .map(|nonce| {
                    let engine = engine.clone();
                    scope.spawn(move || {
                        let claim = sample_claim(100 + nonce);
                        engine
                            .insert_claim(&claim, sample_record(issuer))
                            .unwrap()
                            .h_index_hex
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(h_indexes.len(), 10);
        let mut unique = h_indexes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 10, "all ten claims must have distinct h_index");

        for hi in &h_indexes {
            assert!(engine.get_claim(hi).is_ok());
        }
        assert_ne!(state_before, engine.state_hash().unwrap());
    }
}
