use crate::genesis::{derive_identifier, AUTH_SCHEMA_BYTES, AUTH_SCHEMA_TYPE, DEFAULT_TYPE_TAG};
use crate::schema::SchemaProcessor;
use issuer_claim::{schema_hash, ClaimInput, CoreClaim};
use issuer_crypto::field;
use issuer_crypto::{Fr, Signer};
use issuer_merkle::{Proof, ProofBytes};
use issuer_state::{ClaimRecord, StateEngine};
use issuer_types::{CancellationToken, Digest, Identifier, IssuerError, IssuerResult, SubjectPosition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn check_cancelled(token: &CancellationToken) -> IssuerResult<()> {
    if token.is_cancelled() {
        Err(IssuerError::Cancelled)
    } else {
        Ok(())
    }
}

/// Input to [`Identity::add_claim`].
#[derive(Clone, Debug)]
pub struct AddClaimRequest {
    pub schema_url: String,
    pub schema_type: String,
    pub data: serde_json::Value,
    pub subject_id: Option<Identifier>,
    pub subject_position: SubjectPosition,
    pub revocation_nonce: u64,
    pub version: u32,
    pub expiration: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AddClaimResponse {
    pub id: String,
}

/// The opaque blob stored in [`ClaimRecord::signature_proof`]: the
/// auth-claim signature over `h_index`, plus enough of the auth claim's own
/// state to reconstruct a `BJJSignature2021` proof later.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SignatureProofBlob {
    signature: [u8; 64],
    auth_claim_h_index_hex: String,
    auth_claim_inclusion_proof: ProofBytes,
}

#[derive(Clone, Debug, Serialize)]
pub struct CredentialStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(rename = "revocationNonce")]
    pub revocation_nonce: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum CredentialProof {
    #[serde(rename = "BJJSignature2021")]
    BjjSignature {
        #[serde(rename = "issuerData")]
        issuer_data: serde_json::Value,
        signature: String,
    },
    #[serde(rename = "Iden3SparseMerkleProof")]
    Iden3SparseMerkleProof {
        #[serde(rename = "issuerData")]
        issuer_data: serde_json::Value,
        mtp: ProofBytes,
    },
}

/// A W3C-style verifiable credential.
#[derive(Clone, Debug, Serialize)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuer: String,
    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: serde_json::Value,
    #[serde(rename = "credentialStatus")]
    pub credential_status: CredentialStatus,
    pub proof: Vec<CredentialProof>,
}

/// Full issuer state snapshot, as returned by `GetIdentity` and embedded in
/// `GetRevocationStatus`.
#[derive(Clone, Debug, Serialize)]
pub struct IssuerStateSnapshot {
    pub identifier: Identifier,
    pub state: Digest,
    pub claims_root: Digest,
    pub revocations_root: Digest,
    pub roots_root: Digest,
}

#[derive(Clone, Debug, Serialize)]
pub struct RevocationStatusResponse {
    pub mtp: ProofBytes,
    pub issuer_state: IssuerStateSnapshot,
}

/// The issuer's long-lived identity: signer, genesis-derived identifier, a
/// pointer to the auth claim, the base URL embedded in issued credentials'
/// revocation-status endpoints, and the state engine.
pub struct Identity {
    signer: Signer,
    identifier: Identifier,
    auth_claim_h_index: Fr,
    base_url: String,
    engine: Arc<StateEngine>,
}

impl Identity {
    /// Load a previously genesis'd identity, or perform genesis if the
    /// store has none yet.
    pub fn genesis(signer: Signer, base_url: impl Into<String>, engine: Arc<StateEngine>) -> IssuerResult<Self> {
        let base_url = base_url.into();

        if let Some(identifier) = engine.load_identifier()? {
            let auth_claim_h_index_hex = engine.load_auth_claim_id()?.ok_or_else(|| {
                IssuerError::Internal("identifier persisted but auth_claim_id missing".into())
            })?;
            let auth_claim_h_index = decode_field_hex(&auth_claim_h_index_hex)?;
            return Ok(Self {
                signer,
                identifier,
                auth_claim_h_index,
                base_url,
                engine,
            });
        }

        let pk = signer.public();
        let schema_hash = schema_hash(AUTH_SCHEMA_BYTES, AUTH_SCHEMA_TYPE);
        let input = ClaimInput {
            schema_hash,
            expiration: None,
            version: 0,
            revocation_nonce: 0,
            subject_id: None,
            subject_position: SubjectPosition::None,
            data_slots: vec![field::to_bytes(&pk.x), field::to_bytes(&pk.y)],
        };
        let auth_claim = CoreClaim::encode(&input)?;

        let placeholder_record = ClaimRecord::pending(
            Identifier::from_bytes([0u8; issuer_types::IDENTIFIER_SIZE]),
            "",
            AUTH_SCHEMA_TYPE,
            Vec::new(),
            "",
            0,
            serde_json::Value::Null,
            0,
        );
        let inserted = engine.insert_claim(&auth_claim, placeholder_record)?;

        let root_claims_genesis = engine.claims_root()?;
        let state_hash = field::hash(&[root_claims_genesis, Fr::from(0u64), Fr::from(0u64)])?;
        let identifier = derive_identifier(DEFAULT_TYPE_TAG, state_hash);

        engine.persist_identifier(&identifier)?;
        engine.persist_auth_claim_id(&inserted.h_index_hex)?;
        engine.update_claim(&inserted.h_index_hex, |record| record.issuer = identifier)?;

        info!(identifier = %identifier, "genesis complete");

        Ok(Self {
            signer,
            identifier,
            auth_claim_h_index: auth_claim.h_index(),
            base_url,
            engine,
        })
    }

    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    /// Issue a credential. `token` is checked before the schema fetch and
    /// again before each store access, so a caller that cancels mid-flight
    /// never leaves a claim half-recorded.
    pub fn add_claim(
        &self,
        processor: &dyn SchemaProcessor,
        request: AddClaimRequest,
        issued_at: i64,
        token: CancellationToken,
    ) -> IssuerResult<AddClaimResponse> {
        check_cancelled(&token)?;
        let (data_slots, schema_hash) =
            processor.process(&request.schema_url, &request.schema_type, &request.data)?;

        let input = ClaimInput {
            schema_hash,
            expiration: request.expiration,
            version: request.version,
            revocation_nonce: request.revocation_nonce,
            subject_id: request.subject_id,
            subject_position: request.subject_position,
            data_slots,
        };
        let core_claim = CoreClaim::encode(&input)?;
        let h_index = core_claim.h_index();

        check_cancelled(&token)?;
        let auth_claim_h_index_hex = hex::encode(field::to_bytes(&self.auth_claim_h_index));
        let auth_record = self.engine.get_claim(&auth_claim_h_index_hex)?;
        let auth_claim_inclusion_proof = auth_record.inclusion_proof.ok_or_else(|| {
            IssuerError::Internal("auth claim is missing its inclusion proof".into())
        })?;

        let signature = self.signer.sign(h_index)?;
        let signature_blob = SignatureProofBlob {
            signature: signature.0,
            auth_claim_h_index_hex,
            auth_claim_inclusion_proof,
        };
        let signature_proof = serde_json::to_vec(&signature_blob)
            .map_err(|e| IssuerError::Internal(e.to_string()))?;

        let credential_status_url = format!(
            "{}/api/v1/claims/revocation/status/{}",
            self.base_url, request.revocation_nonce
        );

        let record = ClaimRecord::pending(
            self.identifier,
            request.schema_url,
            request.schema_type,
            signature_proof,
            credential_status_url,
            request.revocation_nonce,
            request.data,
            issued_at,
        );

        check_cancelled(&token)?;
        let inserted = self.engine.insert_claim(&core_claim, record)?;
        Ok(AddClaimResponse { id: inserted.h_index_hex })
    }

    /// Repackage a stored claim record as a verifiable credential. `token`
    /// is checked before the store read.
    pub fn get_claim(&self, h_index_hex: &str, token: CancellationToken) -> IssuerResult<VerifiableCredential> {
        check_cancelled(&token)?;
        let record = self.engine.get_claim(h_index_hex)?;
        let signature_blob: SignatureProofBlob = serde_json::from_slice(&record.signature_proof)
            .map_err(|e| IssuerError::Internal(e.to_string()))?;
        let mtp = record
            .inclusion_proof
            .clone()
            .ok_or_else(|| IssuerError::Internal("claim is missing its inclusion proof".into()))?;
        let claims_root = record.claims_root_at_issuance.unwrap_or_default();

        let issuance_date = chrono::DateTime::from_timestamp(record.issued_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();

        Ok(VerifiableCredential {
            context: vec![
                "https://www.w3.org/2018/credentials/v1".into(),
                "https://schema.iden3.io/core/jsonld/iden3proofs.jsonld".into(),
            ],
            id: format!("urn:iden3:claim:{h_index_hex}"),
            credential_type: vec!["VerifiableCredential".into(), record.schema_type.clone()],
            issuer: self.identifier.to_hex(),
            issuance_date,
            credential_subject: record.request_data.clone(),
            credential_status: CredentialStatus {
                id: record.credential_status_url.clone(),
                status_type: "Iden3ReverseSparseMerkleTreeProof".into(),
                revocation_nonce: record.revocation_nonce,
            },
            proof: vec![
                CredentialProof::BjjSignature {
                    issuer_data: serde_json::json!({
                        "id": self.identifier.to_hex(),
                        "authCoreClaim": signature_blob.auth_claim_h_index_hex,
                    }),
                    signature: hex::encode(signature_blob.signature),
                },
                CredentialProof::Iden3SparseMerkleProof {
                    issuer_data: serde_json::json!({ "state": claims_root.to_hex() }),
                    mtp: mtp.to_bytes(),
                },
            ],
        })
    }

    pub fn get_revocation_status(
        &self,
        nonce: u64,
        token: CancellationToken,
    ) -> IssuerResult<RevocationStatusResponse> {
        check_cancelled(&token)?;
        let mtp = self.engine.revocation_proof(nonce)?;
        check_cancelled(&token)?;
        Ok(RevocationStatusResponse {
            mtp: mtp.to_bytes(),
            issuer_state: self.state_snapshot(&token)?,
        })
    }

    /// Pure read of the current issuer state.
    pub fn get_identity(&self, token: CancellationToken) -> IssuerResult<IssuerStateSnapshot> {
        self.state_snapshot(&token)
    }

    pub fn revoke(&self, nonce: u64, version: u32, token: CancellationToken) -> IssuerResult<()> {
        check_cancelled(&token)?;
        self.engine.revoke(nonce, version)
    }

    pub fn inclusion_proof(&self, h_index_hex: &str) -> IssuerResult<Proof> {
        let h_index = decode_field_hex(h_index_hex)?;
        self.engine.inclusion_proof(h_index)
    }

    fn state_snapshot(&self, token: &CancellationToken) -> IssuerResult<IssuerStateSnapshot> {
        check_cancelled(token)?;
        Ok(IssuerStateSnapshot {
            identifier: self.identifier,
            state: Digest::from_bytes(field::to_bytes(&self.engine.state_hash()?)),
            claims_root: Digest::from_bytes(field::to_bytes(&self.engine.claims_root()?)),
            revocations_root: Digest::from_bytes(field::to_bytes(&self.engine.revocations_root()?)),
            roots_root: Digest::from_bytes(field::to_bytes(&self.engine.roots_root()?)),
        })
    }
}

fn decode_field_hex(hex_str: &str) -> IssuerResult<Fr> {
    let bytes = hex::decode(hex_str).map_err(|e| IssuerError::Internal(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(IssuerError::Internal(format!(
            "expected 32-byte field element, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    field::from_bytes(&arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuer_store::SledStore;
    use issuer_types::IssuerError;

    struct PassthroughProcessor;

    impl SchemaProcessor for PassthroughProcessor {
        fn process(
            &self,
            _schema_url: &str,
            _claim_type: &str,
            data: &serde_json::Value,
        ) -> IssuerResult<(Vec<[u8; 32]>, [u8; 16])> {
            let mut slot = [0u8; 32];
            let bytes = serde_json::to_vec(data).unwrap_or_default();
            let n = bytes.len().min(32);
            slot[..n].copy_from_slice(&bytes[..n]);
            Ok((vec![slot], schema_hash(b"kyc-age schema", "KYCAgeCredential")))
        }
    }

    fn new_identity() -> Identity {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let engine = Arc::new(StateEngine::new(store, 32).unwrap());
        let signer = Signer::from_scalar_bytes(&(1u8..=32u8).collect::<Vec<u8>>());
        Identity::genesis(signer, "https://issuer.example", engine).unwrap()
    }

    #[test]
    fn genesis_is_deterministic_for_the_same_key_and_empty_store() {
        let signer_bytes: Vec<u8> = (1u8..=32u8).collect();

        let store_a = Arc::new(SledStore::in_memory().unwrap());
        let engine_a = Arc::new(StateEngine::new(store_a, 32).unwrap());
        let identity_a =
            Identity::genesis(Signer::from_scalar_bytes(&signer_bytes), "https://x", engine_a).unwrap();

        let store_b = Arc::new(SledStore::in_memory().unwrap());
        let engine_b = Arc::new(StateEngine::new(store_b, 32).unwrap());
        let identity_b =
            Identity::genesis(Signer::from_scalar_bytes(&signer_bytes), "https://x", engine_b).unwrap();

        assert_eq!(identity_a.identifier(), identity_b.identifier());
    }

    #[test]
    fn genesis_reload_returns_same_identifier() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let engine = Arc::new(StateEngine::new(store, 32).unwrap());
        let signer_bytes = [7u8; 32];

        let first = Identity::genesis(Signer::from_scalar_bytes(&signer_bytes), "https://x", engine.clone())
            .unwrap();
        let second =
            Identity::genesis(Signer::from_scalar_bytes(&signer_bytes), "https://x", engine).unwrap();

        assert_eq!(first.identifier(), second.identifier());
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let identity = new_identity();
        let request = AddClaimRequest {
            schema_url: "ipfs://Qm.../kyc-age.json-ld".into(),
            schema_type: "KYCAgeCredential".into(),
            data: serde_json::json!({"birthday": 19900101, "documentType": 1}),
            subject_id: Some(Identifier::from_bytes([0x11; issuer_types::IDENTIFIER_SIZE])),
            subject_position: SubjectPosition::Index,
            revocation_nonce: 7,
            version: 0,
            expiration: None,
        };

        let response = identity
            .add_claim(&PassthroughProcessor, request, 1_700_000_000, CancellationToken::new())
            .unwrap();
        assert_eq!(response.id.len(), 64);

        let credential = identity.get_claim(&response.id, CancellationToken::new()).unwrap();
        assert_eq!(credential.credential_status.revocation_nonce, 7);
        assert_eq!(credential.proof.len(), 2);
    }

    #[test]
    fn revoke_then_status_shows_existence_and_state_changes() {
        let identity = new_identity();
        let request = AddClaimRequest {
            schema_url: "ipfs://Qm.../kyc-age.json-ld".into(),
            schema_type: "KYCAgeCredential".into(),
            data: serde_json::json!({"birthday": 19900101}),
            subject_id: None,
            subject_position: SubjectPosition::None,
            revocation_nonce: 9,
            version: 0,
            expiration: None,
        };
        identity
            .add_claim(&PassthroughProcessor, request, 1_700_000_000, CancellationToken::new())
            .unwrap();

        let state_before = identity.get_identity(CancellationToken::new()).unwrap().state;
        identity.revoke(9, 0, CancellationToken::new()).unwrap();
        let state_after = identity.get_identity(CancellationToken::new()).unwrap().state;
        assert_ne!(state_before, state_after);

        let status = identity
            .get_revocation_status(9, CancellationToken::new())
            .unwrap();
        assert!(status.mtp.existence);
    }

    #[test]
    fn duplicate_add_claim_fails_and_state_hash_unchanged() {
        let identity = new_identity();
        let request = AddClaimRequest {
            schema_url: "ipfs://Qm.../kyc-age.json-ld".into(),
            schema_type: "KYCAgeCredential".into(),
            data: serde_json::json!({"birthday": 19900101}),
            subject_id: None,
            subject_position: SubjectPosition::None,
            revocation_nonce: 11,
            version: 0,
            expiration: None,
        };
        identity
            .add_claim(&PassthroughProcessor, request.clone(), 1_700_000_000, CancellationToken::new())
            .unwrap();
        let state_after_first = identity.get_identity(CancellationToken::new()).unwrap().state;

        let result = identity.add_claim(
            &PassthroughProcessor,
            request,
            1_700_000_001,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(IssuerError::Duplicate(_))));
        assert_eq!(
            state_after_first,
            identity.get_identity(CancellationToken::new()).unwrap().state
        );
    }

    #[test]
    fn add_claim_rejects_a_pre_cancelled_token() {
        let identity = new_identity();
        let request = AddClaimRequest {
            schema_url: "ipfs://Qm.../kyc-age.json-ld".into(),
            schema_type: "KYCAgeCredential".into(),
            data: serde_json::json!({"birthday": 19900101}),
            subject_id: None,
            subject_position: SubjectPosition::None,
            revocation_nonce: 42,
            version: 0,
            expiration: None,
        };

        let token = CancellationToken::new();
        token.cancel();
        let result = identity.add_claim(&PassthroughProcessor, request, 1_700_000_000, token);
        assert!(matches!(result, Err(IssuerError::Cancelled)));
    }

    #[test]
    fn identifier_stable_across_multiple_add_claim_calls() {
        let identity = new_identity();
        let id_before = identity.identifier();
        for nonce in 0..3u64 {
            let request = AddClaimRequest {
                schema_url: "ipfs://Qm.../kyc-age.json-ld".into(),
                schema_type: "KYCAgeCredential".into(),
                data: serde_json::json!({"n": nonce}),
                subject_id: None,
                subject_position: SubjectPosition::None,
                revocation_nonce: 100 + nonce,
                version: 0,
                expiration: None,
            };
            identity
                .add_claim(&PassthroughProcessor, request, 1_700_000_000, CancellationToken::new())
                .unwrap();
        }
        assert_eq!(id_before, identity.identifier());
    }
}
