#![forbid(unsafe_code)]

pub mod field;
pub mod signer;

pub use ark_bn254::Fr;
pub use signer::{PublicKey, Signature, Signer};
