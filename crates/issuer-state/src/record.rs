use issuer_merkle::ProofBytes;
use issuer_types::{Digest, Identifier};
use serde::{Deserialize, Serialize};

/// The database shape of an issued claim. Everything needed to rebuild a
/// verifiable credential without recomputing proofs lives here;
/// `inclusion_proof` and `claims_root_at_issuance` start out `None` and are
/// filled in by [`crate::StateEngine::insert_claim`] once the Claims tree
/// has actually been mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub h_index_hex: String,
    pub issuer: Identifier,
    pub schema_url: String,
    pub schema_type: String,
    /// Opaque `BJJSignature2021`-style proof blob assembled by the identity
    /// layer: the auth-claim signature over `h_index`, plus the auth
    /// claim's own inclusion proof, serialized together.
    pub signature_proof: Vec<u8>,
    pub inclusion_proof: Option<ProofBytes>,
    pub claims_root_at_issuance: Option<Digest>,
    pub credential_status_url: String,
    pub revocation_nonce: u64,
    pub request_data: serde_json::Value,
    pub issued_at: i64,
    pub revoked: bool,
}

impl ClaimRecord {
    /// A record with proof fields left for `insert_claim` to fill in.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        issuer: Identifier,
        schema_url: impl Into<String>,
        schema_type: impl Into<String>,
        signature_proof: Vec<u8>,
        credential_status_url: impl Into<String>,
        revocation_nonce: u64,
        request_data: serde_json::Value,
        issued_at: i64,
    ) -> Self {
        Self {
            h_index_hex: String::new(),
            issuer,
            schema_url: schema_url.into(),
            schema_type: schema_type.into(),
            signature_proof,
            inclusion_proof: None,
            claims_root_at_issuance: None,
            credential_status_url: credential_status_url.into(),
            revocation_nonce,
            request_data,
            issued_at,
            revoked: false,
        }
    }
}
