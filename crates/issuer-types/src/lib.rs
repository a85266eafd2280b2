#![forbid(unsafe_code)]

mod cancellation;
mod digest;
mod error;
mod identifier;

pub use cancellation::CancellationToken;
pub use digest::{Digest, DIGEST_SIZE};
pub use error::{IssuerError, IssuerResult};
pub use identifier::{Identifier, IDENTIFIER_SIZE};

/// Subject position within a claim: which slot group, if any, carries the
/// credential subject's identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SubjectPosition {
    None,
    Index,
    Value,
}
