use crate::error::{IssuerError, IssuerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const IDENTIFIER_SIZE: usize = 31;

/// The issuer's genesis-derived identifier. Immutable for the lifetime
/// of the identity — only `state` evolves after genesis.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(pub [u8; IDENTIFIER_SIZE]);

impl Identifier {
    pub fn from_bytes(bytes: [u8; IDENTIFIER_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> IssuerResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| IssuerError::Internal(e.to_string()))?;
        if bytes.len() != IDENTIFIER_SIZE {
            return Err(IssuerError::Internal("invalid identifier length".into()));
        }
        let mut arr = [0u8; IDENTIFIER_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn type_tag(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
