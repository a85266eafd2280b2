use thiserror::Error;

/// The flat error taxonomy shared by every crate in this workspace.
///
/// Kept as one enum rather than one-per-crate so callers at the operator
/// surface (HTTP handlers, CLI commands — both outside this workspace) can
/// match on a single type regardless of which component raised it.
#[derive(Error, Debug)]
pub enum IssuerError {
    #[error("value is not a canonical field element: {0}")]
    NotInField(String),

    #[error("poseidon domain overflow: expected 1..=16 inputs, got {0}")]
    DomainOverflow(usize),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("duplicate insert: {0}")]
    Duplicate(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("tree depth exceeded: keys share all {0} low-order bits")]
    DepthExceeded(usize),

    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("state unchanged: old and new state are identical")]
    StateUnchanged,

    #[error("already revoked: {0}")]
    AlreadyRevoked(String),

    #[error("store I/O error: {0}")]
    StoreIO(String),

    #[error("chain I/O error: {0}")]
    ChainIO(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid claim encoding: {0}")]
    InvalidClaim(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type IssuerResult<T> = Result<T, IssuerError>;
