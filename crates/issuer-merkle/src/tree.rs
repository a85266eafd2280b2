use crate::node::{path_bit, Node};
use crate::proof::{verify_proof, Proof};
use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_store::Store;
use issuer_types::{IssuerError, IssuerResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

const ROOT_KEY: &[u8] = b"root";

/// A fixed-depth sparse Merkle tree backed by a `Store`.
///
/// Node writes are content-addressed (keyed by their own hash), so a
/// crash mid-insert leaves at most unreferenced node garbage — the root
/// pointer, written last, is the only thing that determines what is
/// externally visible. All mutations take `lock` as a write lock; reads
/// that must observe a consistent root (generating or verifying a proof)
/// take it as a read lock.
pub struct SparseMerkleTree {
    store: Arc<dyn Store>,
    tree_id: String,
    depth: usize,
    lock: RwLock<()>,
}

impl SparseMerkleTree {
    pub fn new(store: Arc<dyn Store>, tree_id: impl Into<String>, depth: usize) -> IssuerResult<Self> {
        Ok(Self {
            store,
            tree_id: tree_id.into(),
            depth,
            lock: RwLock::new(()),
        })
    }

    fn nodes_keyspace(&self) -> String {
        format!("tree/{}/nodes", self.tree_id)
    }

    fn root_keyspace(&self) -> String {
        format!("tree/{}/root", self.tree_id)
    }

    fn load_node(&self, hash: Fr) -> IssuerResult<Node> {
        if hash == Fr::from(0u64) {
            return Ok(Node::Empty);
        }
        let key = field::to_bytes(&hash);
        match self.store.get(&self.nodes_keyspace(), &key)? {
            Some(bytes) => Node::decode(&bytes),
            None => Err(IssuerError::Internal(format!(
                "dangling node reference {}",
                hex::encode(key)
            ))),
        }
    }

    fn write_node(&self, node: &Node) -> IssuerResult<Fr> {
        let hash = node.hash();
        if !matches!(node, Node::Empty) {
            let key = field::to_bytes(&hash);
            self.store.put(&self.nodes_keyspace(), &key, &node.encode())?;
        }
        Ok(hash)
    }

    fn read_root(&self) -> IssuerResult<Fr> {
        match self.store.get(&self.root_keyspace(), ROOT_KEY)? {
            Some(bytes) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                field::from_bytes(&arr)
            }
            None => Ok(Fr::from(0u64)),
        }
    }

    fn write_root(&self, root: Fr) -> IssuerResult<()> {
        self.store
            .put(&self.root_keyspace(), ROOT_KEY, &field::to_bytes(&root))?;
        self.store.flush()
    }

    /// Current root, taking the read lock so it reflects a single,
    /// completed mutation rather than one in flight.
    pub fn root(&self) -> IssuerResult<Fr> {
        let _guard = self.lock.read();
        self.read_root()
    }

    /// Force the root pointer to `root` without touching node storage —
    /// used by callers that coordinate several trees (e.g. `StateEngine`)
    /// to roll back this tree's root after a multi-tree mutation fails
    /// partway through. Node garbage left behind by the aborted mutation
    /// is harmless: nodes are content-addressed and simply become
    /// unreachable from the restored root.
    pub fn restore_root(&self, root: Fr) -> IssuerResult<()> {
        let _guard = self.lock.write();
        self.write_root(root)
    }

    /// Insert `(key, value)`. Fails `KeyExists` if `key` is already
    /// present; `DepthExceeded` if an existing key shares all `D`
    /// low-order bits with `key`.
    pub fn add(&self, key: Fr, value: Fr) -> IssuerResult<()> {
        let _guard = self.lock.write();
        let root = self.read_root()?;
        let new_root = self.insert_at(root, key, value, 0)?;
        self.write_root(new_root)?;
        debug!(tree = %self.tree_id, "inserted leaf");
        Ok(())
    }

    fn insert_at(&self, current: Fr, key: Fr, value: Fr, depth: usize) -> IssuerResult<Fr> {
        match self.load_node(current)? {
            Node::Empty => self.write_node(&Node::Leaf { key, value }),
            Node::Leaf {
                key: existing_key,
                value: existing_value,
            } => {
                if existing_key == key {
                    return Err(IssuerError::KeyExists(hex::encode(field::to_bytes(&key))));
                }
                self.push_down(key, value, existing_key, existing_value, depth)
            }
            Node::Middle { left, right } => {
                if depth >= self.depth {
                    return Err(IssuerError::Internal(
                        "middle node at maximum depth".into(),
                    ));
                }
                if !path_bit(&key, depth) {
                    let new_left = self.insert_at(left, key, value, depth + 1)?;
                    self.write_node(&Node::Middle {
                        left: new_left,
                        right,
                    })
                } else {
                    let new_right = self.insert_at(right, key, value, depth + 1)?;
                    self.write_node(&Node::Middle {
                        left,
                        right: new_right,
                    })
                }
            }
        }
    }

    /// Split two colliding leaves into `Middle` nodes, descending until
    /// their path bits first differ.
    fn push_down(&self, key_a: Fr, val_a: Fr, key_b: Fr, val_b: Fr, depth: usize) -> IssuerResult<Fr> {
        if depth >= self.depth {
            return Err(IssuerError::DepthExceeded(self.depth));
        }
        let bit_a = path_bit(&key_a, depth);
        let bit_b = path_bit(&key_b, depth);

        if bit_a != bit_b {
            let leaf_a = self.write_node(&Node::Leaf {
                key: key_a,
                value: val_a,
            })?;
            let leaf_b = self.write_node(&Node::Leaf {
                key: key_b,
                value: val_b,
            })?;
            let (left, right) = if !bit_a { (leaf_a, leaf_b) } else { (leaf_b, leaf_a) };
            self.write_node(&Node::Middle { left, right })
        } else {
            let child = self.push_down(key_a, val_a, key_b, val_b, depth + 1)?;
            let (left, right) = if !bit_a {
                (child, Fr::from(0u64))
            } else {
                (Fr::from(0u64), child)
            };
            self.write_node(&Node::Middle { left, right })
        }
    }

    /// Replace the value at `key`, returning the old value. Fails
    /// `KeyNotFound` if `key` is absent.
    pub fn update(&self, key: Fr, value: Fr) -> IssuerResult<Fr> {
        let _guard = self.lock.write();
        let root = self.read_root()?;
        let (new_root, old_value) = self.update_at(root, key, value, 0)?;
        self.write_root(new_root)?;
        Ok(old_value)
    }

    fn update_at(&self, current: Fr, key: Fr, value: Fr, depth: usize) -> IssuerResult<(Fr, Fr)> {
        match self.load_node(current)? {
            Node::Empty => Err(IssuerError::KeyNotFound(hex::encode(field::to_bytes(&key)))),
            Node::Leaf {
                key: existing_key,
                value: existing_value,
            } => {
                if existing_key != key {
                    return Err(IssuerError::KeyNotFound(hex::encode(field::to_bytes(&key))));
                }
                let new_hash = self.write_node(&Node::Leaf { key, value })?;
                Ok((new_hash, existing_value))
            }
            Node::Middle { left, right } => {
                if !path_bit(&key, depth) {
                    let (new_left, old) = self.update_at(left, key, value, depth + 1)?;
                    let new_hash = self.write_node(&Node::Middle {
                        left: new_left,
                        right,
                    })?;
                    Ok((new_hash, old))
                } else {
                    let (new_right, old) = self.update_at(right, key, value, depth + 1)?;
                    let new_hash = self.write_node(&Node::Middle {
                        left,
                        right: new_right,
                    })?;
                    Ok((new_hash, old))
                }
            }
        }
    }

    /// Look up `key`, returning its value (if present) and the sibling
    /// hashes along the descended path.
    pub fn get(&self, key: Fr) -> IssuerResult<(Option<Fr>, Vec<Fr>)> {
        let _guard = self.lock.read();
        let mut siblings = Vec::new();
        let mut current = self.read_root()?;
        let mut depth = 0usize;

        loop {
            match self.load_node(current)? {
                Node::Empty => return Ok((None, siblings)),
                Node::Leaf {
                    key: existing_key,
                    value,
                } => {
                    if existing_key == key {
                        return Ok((Some(value), siblings));
                    }
                    return Ok((None, siblings));
                }
                Node::Middle { left, right } => {
                    if depth >= self.depth {
                        return Err(IssuerError::Internal("exceeded tree depth during get".into()));
                    }
                    if !path_bit(&key, depth) {
                        siblings.push(right);
                        current = left;
                    } else {
                        siblings.push(left);
                        current = right;
                    }
                    depth += 1;
                }
            }
        }
    }

    /// Build an inclusion or non-membership proof for `key`.
    pub fn generate_proof(&self, key: Fr) -> IssuerResult<Proof> {
        let _guard = self.lock.read();
        let mut siblings = Vec::new();
        let mut current = self.read_root()?;
        let mut depth = 0usize;

        loop {
            match self.load_node(current)? {
                Node::Empty => {
                    return Ok(Proof {
                        existence: false,
                        siblings,
                        node_aux: None,
                    })
                }
                Node::Leaf {
                    key: existing_key,
                    value,
                } => {
                    return if existing_key == key {
                        Ok(Proof {
                            existence: true,
                            siblings,
                            node_aux: None,
                        })
                    } else {
                        Ok(Proof {
                            existence: false,
                            siblings,
                            node_aux: Some((existing_key, value)),
                        })
                    }
                }
                Node::Middle { left, right } => {
                    if depth >= self.depth {
                        return Err(IssuerError::Internal(
                            "exceeded tree depth during proof generation".into(),
                        ));
                    }
                    if !path_bit(&key, depth) {
                        siblings.push(right);
                        current = left;
                    } else {
                        siblings.push(left);
                        current = right;
                    }
                    depth += 1;
                }
            }
        }
    }

    pub fn verify_proof(&self, root: Fr, proof: &Proof, key: Fr, value: Fr) -> bool {
        verify_proof(root, proof, key, value)
    }
}
