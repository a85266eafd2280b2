#![forbid(unsafe_code)]

mod node;
mod proof;
mod tree;

pub use issuer_crypto::Fr;
pub use node::{path_bit, Node};
pub use proof::{verify_proof, Proof, ProofBytes};
pub use tree::SparseMerkleTree;
