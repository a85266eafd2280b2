use crate::node::path_bit;
use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_types::IssuerResult;
use serde::{Deserialize, Serialize};

/// An inclusion or non-membership proof.
///
/// `siblings` holds one hash per level actually descended — it stops at
/// the first `Leaf`/`Empty` node, which may be before the tree's full
/// depth `D`; levels below that point are implicitly empty on both sides
/// of the proof, so verification needs nothing further from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub existence: bool,
    pub siblings: Vec<Fr>,
    /// Present for non-membership proofs where the path terminates at a
    /// *different* leaf rather than an empty node — distinguishes "this
    /// path is genuinely empty" from "this path is occupied by someone
    /// else, and you diverged from them partway down".
    pub node_aux: Option<(Fr, Fr)>,
}

/// Byte-serializable mirror of [`Proof`] for persistence in a claim record
/// or transmission as a verifiable-credential proof blob — `Fr` itself has
/// no stable wire encoding outside this crate's own canonical bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofBytes {
    pub existence: bool,
    pub siblings: Vec<[u8; 32]>,
    pub node_aux: Option<([u8; 32], [u8; 32])>,
}

impl Proof {
    pub fn to_bytes(&self) -> ProofBytes {
        ProofBytes {
            existence: self.existence,
            siblings: self.siblings.iter().map(field::to_bytes).collect(),
            node_aux: self
                .node_aux
                .map(|(k, v)| (field::to_bytes(&k), field::to_bytes(&v))),
        }
    }

    pub fn from_bytes(bytes: &ProofBytes) -> IssuerResult<Self> {
        let siblings = bytes
            .siblings
            .iter()
            .map(field::from_bytes)
            .collect::<IssuerResult<Vec<Fr>>>()?;
        let node_aux = match bytes.node_aux {
            Some((k, v)) => Some((field::from_bytes(&k)?, field::from_bytes(&v)?)),
            None => None,
        };
        Ok(Proof {
            existence: bytes.existence,
            siblings,
            node_aux,
        })
    }
}

/// Verify `proof` shows `key -> value` (existence) or `key`'s absence
/// (non-existence) under `root`.
pub fn verify_proof(root: Fr, proof: &Proof, key: Fr, value: Fr) -> bool {
    let leaf_hash = if proof.existence {
        field::hash(&[key, value, Fr::from(1u64)]).expect("3 is within 1..=16")
    } else {
        match proof.node_aux {
            Some((aux_key, aux_value)) => {
                if aux_key == key {
                    return false; // an existing leaf cannot also be a non-membership witness for itself
                }
                field::hash(&[aux_key, aux_value, Fr::from(1u64)]).expect("3 is within 1..=16")
            }
            None => Fr::from(0u64),
        }
    };

    let mut current = leaf_hash;
    for (depth, sibling) in proof.siblings.iter().enumerate().rev() {
        current = if path_bit(&key, depth) {
            field::hash2(*sibling, current)
        } else {
            field::hash2(current, *sibling)
        };
    }

    current == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SparseMerkleTree;
    use issuer_store::SledStore;
    use std::sync::Arc;

    #[test]
    fn existence_proof_verifies() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let tree = SparseMerkleTree::new(store, "t", 8).unwrap();
        tree.add(Fr::from(3u64), Fr::from(30u64)).unwrap();
        tree.add(Fr::from(7u64), Fr::from(70u64)).unwrap();

        let root = tree.root().unwrap();
        let proof = tree.generate_proof(Fr::from(3u64)).unwrap();
        assert!(proof.existence);
        assert!(verify_proof(root, &proof, Fr::from(3u64), Fr::from(30u64)));
    }

    #[test]
    fn non_membership_against_empty_path_verifies() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let tree = SparseMerkleTree::new(store, "t", 8).unwrap();
        tree.add(Fr::from(3u64), Fr::from(30u64)).unwrap();

        let root = tree.root().unwrap();
        let proof = tree.generate_proof(Fr::from(200u64)).unwrap();
        assert!(!proof.existence);
        assert!(verify_proof(root, &proof, Fr::from(200u64), Fr::from(0u64)));
    }

    #[test]
    fn non_membership_against_other_leaf_verifies() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let tree = SparseMerkleTree::new(store, "t", 8).unwrap();
        tree.add(Fr::from(3u64), Fr::from(30u64)).unwrap();

        let root = tree.root().unwrap();
        // a key whose low bits collide with 3 down to some depth but then diverge
        let proof = tree.generate_proof(Fr::from(11u64)).unwrap();
        assert!(!proof.existence);
        assert!(verify_proof(root, &proof, Fr::from(11u64), Fr::from(0u64)));
    }

    #[test]
    fn proof_bytes_round_trip() {
        let store = Arc::new(SledStore::in_memory().unwrap());
        let tree = SparseMerkleTree::new(store, "t", 8).unwrap();
        tree.add(Fr::from(3u64), Fr::from(30u64)).unwrap();
        tree.add(Fr::from(7u64), Fr::from(70u64)).unwrap();

        let proof = tree.generate_proof(Fr::from(3u64)).unwrap();
        let decoded = Proof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
    }
}
