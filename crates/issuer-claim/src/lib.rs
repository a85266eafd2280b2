#![forbid(unsafe_code)]

mod claim;

pub use claim::{schema_hash, ClaimInput, CoreClaim, SCHEMA_HASH_SIZE};
