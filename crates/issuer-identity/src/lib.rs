#![forbid(unsafe_code)]

mod genesis;
mod identity;
mod schema;

pub use genesis::{derive_identifier, AUTH_SCHEMA_BYTES, AUTH_SCHEMA_TYPE, DEFAULT_TYPE_TAG};
pub use identity::{
    AddClaimRequest, AddClaimResponse, CredentialProof, CredentialStatus, Identity,
    IssuerStateSnapshot, RevocationStatusResponse, VerifiableCredential,
};
pub use schema::{SchemaCache, SchemaProcessor, SchemaSource, SchemaTransport};
