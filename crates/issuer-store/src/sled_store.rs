use crate::Store;
use issuer_types::{IssuerError, IssuerResult};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

/// `sled`-backed `Store`. Keyspaces map 1:1 onto `sled::Tree`s, opened
/// lazily and cached, minus a fixed, hand-enumerated tree list: this
/// store's keyspace names are chosen by its callers (tree ids are not
/// known ahead of time), so trees are opened on first use rather than all
/// at startup.
pub struct SledStore {
    db: Db,
    trees: RwLock<HashMap<String, Tree>>,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> IssuerResult<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|e| IssuerError::StoreIO(format!("failed to open database: {e}")))?;
        debug!("opened identity store");
        Ok(Self {
            db,
            trees: RwLock::new(HashMap::new()),
        })
    }

    pub fn in_memory() -> IssuerResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| IssuerError::StoreIO(format!("failed to open temp database: {e}")))?;
        Ok(Self {
            db,
            trees: RwLock::new(HashMap::new()),
        })
    }

    fn tree(&self, keyspace: &str) -> IssuerResult<Tree> {
        if let Some(t) = self.trees.read().unwrap().get(keyspace) {
            return Ok(t.clone());
        }
        let mut trees = self.trees.write().unwrap();
        if let Some(t) = trees.get(keyspace) {
            return Ok(t.clone());
        }
        let t = self
            .db
            .open_tree(keyspace)
            .map_err(|e| IssuerError::StoreIO(format!("failed to open tree {keyspace}: {e}")))?;
        trees.insert(keyspace.to_string(), t.clone());
        Ok(t)
    }
}

impl Store for SledStore {
    fn get(&self, keyspace: &str, key: &[u8]) -> IssuerResult<Option<Vec<u8>>> {
        let t = self.tree(keyspace)?;
        let v = t
            .get(key)
            .map_err(|e| IssuerError::StoreIO(format!("get {keyspace}: {e}")))?;
        Ok(v.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, keyspace: &str, key: &[u8], value: &[u8]) -> IssuerResult<()> {
        let t = self.tree(keyspace)?;
        t.insert(key, value)
            .map_err(|e| IssuerError::StoreIO(format!("put {keyspace}: {e}")))?;
        Ok(())
    }

    fn delete(&self, keyspace: &str, key: &[u8]) -> IssuerResult<()> {
        let t = self.tree(keyspace)?;
        t.remove(key)
            .map_err(|e| IssuerError::StoreIO(format!("delete {keyspace}: {e}")))?;
        Ok(())
    }

    fn flush(&self) -> IssuerResult<()> {
        self.db
            .flush()
            .map_err(|e| IssuerError::StoreIO(format!("flush: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trip() {
        let store = SledStore::in_memory().unwrap();
        store.put("claims", b"key1", b"value1").unwrap();
        assert_eq!(
            store.get("claims", b"key1").unwrap(),
            Some(b"value1".to_vec())
        );
    }

    #[test]
    fn missing_key_is_none() {
        let store = SledStore::in_memory().unwrap();
        assert_eq!(store.get("claims", b"nope").unwrap(), None);
    }

    #[test]
    fn delete_removes_key() {
        let store = SledStore::in_memory().unwrap();
        store.put("claims", b"k", b"v").unwrap();
        store.delete("claims", b"k").unwrap();
        assert_eq!(store.get("claims", b"k").unwrap(), None);
    }

    #[test]
    fn keyspaces_are_independent() {
        let store = SledStore::in_memory().unwrap();
        store.put("tree/claims/nodes", b"k", b"a").unwrap();
        store.put("tree/revocations/nodes", b"k", b"b").unwrap();
        assert_eq!(
            store.get("tree/claims/nodes", b"k").unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(
            store.get("tree/revocations/nodes", b"k").unwrap(),
            Some(b"b".to_vec())
        );
    }
}
