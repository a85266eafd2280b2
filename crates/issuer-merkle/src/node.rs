use ark_ff::BigInteger;
use ark_ff::PrimeField;
use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_types::{IssuerError, IssuerResult};

const TAG_LEAF: u8 = 1;
const TAG_MIDDLE: u8 = 2;

/// A sparse Merkle tree node. `Empty` is never persisted — its hash is the
/// fixed constant zero and it is represented by the *absence* of an entry
/// for that hash in the node store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Empty,
    Leaf { key: Fr, value: Fr },
    Middle { left: Fr, right: Fr },
}

impl Node {
    /// `Empty -> 0`, `Leaf -> Poseidon(key, value, 1)`,
    /// `Middle -> Poseidon(left, right)`.
    pub fn hash(&self) -> Fr {
        match self {
            Node::Empty => Fr::from(0u64),
            Node::Leaf { key, value } => {
                field::hash(&[*key, *value, Fr::from(1u64)]).expect("3 is within 1..=16")
            }
            Node::Middle { left, right } => field::hash2(*left, *right),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Node::Empty => vec![],
            Node::Leaf { key, value } => {
                let mut out = Vec::with_capacity(65);
                out.push(TAG_LEAF);
                out.extend_from_slice(&field::to_bytes(key));
                out.extend_from_slice(&field::to_bytes(value));
                out
            }
            Node::Middle { left, right } => {
                let mut out = Vec::with_capacity(65);
                out.push(TAG_MIDDLE);
                out.extend_from_slice(&field::to_bytes(left));
                out.extend_from_slice(&field::to_bytes(right));
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> IssuerResult<Self> {
        if bytes.is_empty() {
            return Ok(Node::Empty);
        }
        if bytes.len() != 65 {
            return Err(IssuerError::Internal(format!(
                "corrupt node encoding: {} bytes",
                bytes.len()
            )));
        }
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a.copy_from_slice(&bytes[1..33]);
        b.copy_from_slice(&bytes[33..65]);
        match bytes[0] {
            TAG_LEAF => Ok(Node::Leaf {
                key: field::from_bytes(&a)?,
                value: field::from_bytes(&b)?,
            }),
            TAG_MIDDLE => Ok(Node::Middle {
                left: field::from_bytes(&a)?,
                right: field::from_bytes(&b)?,
            }),
            tag => Err(IssuerError::Internal(format!("unknown node tag {tag}"))),
        }
    }
}

/// Bit `depth` of `key`, counting from the least-significant bit — the
/// low-order bits choose the leaf path. `0` means the path descends left,
/// `1` means right.
pub fn path_bit(key: &Fr, depth: usize) -> bool {
    key.into_bigint().get_bit(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_is_zero() {
        assert_eq!(Node::Empty.hash(), Fr::from(0u64));
    }

    #[test]
    fn encode_decode_round_trip_leaf() {
        let node = Node::Leaf {
            key: Fr::from(5u64),
            value: Fr::from(9u64),
        };
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn encode_decode_round_trip_middle() {
        let node = Node::Middle {
            left: Fr::from(1u64),
            right: Fr::from(2u64),
        };
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn empty_encodes_to_nothing() {
        assert!(Node::Empty.encode().is_empty());
        assert_eq!(Node::decode(&[]).unwrap(), Node::Empty);
    }

    #[test]
    fn path_bit_reads_lsb_first() {
        let key = Fr::from(0b0000_0110u64); // bits: 0,1,1,0,...
        assert!(!path_bit(&key, 0));
        assert!(path_bit(&key, 1));
        assert!(path_bit(&key, 2));
        assert!(!path_bit(&key, 3));
    }
}
