use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_types::{Identifier, IssuerError, IssuerResult, SubjectPosition, IDENTIFIER_SIZE};
use sha3::{Digest, Keccak256};

pub const SCHEMA_HASH_SIZE: usize = 16;
const MAX_DATA_SLOTS: usize = 3;

const FLAG_SUBJECT_MASK: u8 = 0b0000_0011;
const FLAG_SUBJECT_INDEX: u8 = 0b0000_0001;
const FLAG_SUBJECT_VALUE: u8 = 0b0000_0010;
const FLAG_EXPIRATION: u8 = 0b0000_0100;

/// What a caller supplies to build a [`CoreClaim`] via [`CoreClaim::encode`].
#[derive(Clone, Debug)]
pub struct ClaimInput {
    pub schema_hash: [u8; SCHEMA_HASH_SIZE],
    pub expiration: Option<u64>,
    pub version: u32,
    pub revocation_nonce: u64,
    pub subject_id: Option<Identifier>,
    pub subject_position: SubjectPosition,
    /// Up to three 32-byte application data slots. Always packed into
    /// `v_0..v_2`; `v_3` is reserved for the subject id when
    /// `subject_position == Value`.
    pub data_slots: Vec<[u8; 32]>,
}

/// The eight-slot on-chain claim shape.
///
/// Slot layout (little-endian throughout):
/// - `i_0`: `schema_hash(16B) || flags(1B) || reserved(3B) || version(4B LE) || revocation_nonce(8B LE)`
/// - `i_1`: `expiration(8B LE, zero if absent) || reserved(24B)`
/// - `i_2`: `subject_id(31B zero-padded) || reserved(1B)`, present iff `subject_position == Index`
/// - `i_3`: reserved, always zero
/// - `v_0..v_2`: application data slots, as given by the schema processor
/// - `v_3`: `subject_id(31B zero-padded) || reserved(1B)`, present iff `subject_position == Value`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreClaim {
    pub index_slots: [[u8; 32]; 4],
    pub value_slots: [[u8; 32]; 4],
}

impl CoreClaim {
    pub fn encode(input: &ClaimInput) -> IssuerResult<Self> {
        if input.data_slots.len() > MAX_DATA_SLOTS {
            return Err(IssuerError::InvalidClaim(format!(
                "at most {MAX_DATA_SLOTS} data slots supported, got {}",
                input.data_slots.len()
            )));
        }

        let mut flags = match input.subject_position {
            SubjectPosition::None => 0,
            SubjectPosition::Index => FLAG_SUBJECT_INDEX,
            SubjectPosition::Value => FLAG_SUBJECT_VALUE,
        };
        if input.expiration.is_some() {
            flags |= FLAG_EXPIRATION;
        }

        let mut i0 = [0u8; 32];
        i0[0..16].copy_from_slice(&input.schema_hash);
        i0[16] = flags;
        i0[20..24].copy_from_slice(&input.version.to_le_bytes());
        i0[24..32].copy_from_slice(&input.revocation_nonce.to_le_bytes());

        let mut i1 = [0u8; 32];
        if let Some(expiration) = input.expiration {
            i1[0..8].copy_from_slice(&expiration.to_le_bytes());
        }

        let mut i2 = [0u8; 32];
        let i3 = [0u8; 32];
        let mut v3 = [0u8; 32];

        match input.subject_position {
            SubjectPosition::Index => {
                let id = input.subject_id.as_ref().ok_or_else(|| {
                    IssuerError::InvalidClaim(
                        "subject_position is index but no subject_id given".into(),
                    )
                })?;
                i2[0..IDENTIFIER_SIZE].copy_from_slice(id.as_bytes());
            }
            SubjectPosition::Value => {
                let id = input.subject_id.as_ref().ok_or_else(|| {
                    IssuerError::InvalidClaim(
                        "subject_position is value but no subject_id given".into(),
                    )
                })?;
                v3[0..IDENTIFIER_SIZE].copy_from_slice(id.as_bytes());
            }
            SubjectPosition::None => {
                if input.subject_id.is_some() {
                    return Err(IssuerError::InvalidClaim(
                        "subject_id given but subject_position is none".into(),
                    ));
                }
            }
        }

        let mut v0 = [0u8; 32];
        let mut v1 = [0u8; 32];
        let mut v2 = [0u8; 32];
        for (slot, data) in [&mut v0, &mut v1, &mut v2]
            .into_iter()
            .zip(input.data_slots.iter())
        {
            *slot = *data;
        }

        Ok(CoreClaim {
            index_slots: [i0, i1, i2, i3],
            value_slots: [v0, v1, v2, v3],
        })
    }

    /// `Poseidon(i_0..i_3)` — the Claims-tree key.
    pub fn h_index(&self) -> Fr {
        let elements: Vec<Fr> = self
            .index_slots
            .iter()
            .map(|slot| field::from_bytes_mod_order(slot))
            .collect();
        field::hash(&elements).expect("4 is within 1..=16")
    }

    /// `Poseidon(v_0..v_3)` — the Claims-tree value.
    pub fn h_value(&self) -> Fr {
        let elements: Vec<Fr> = self
            .value_slots
            .iter()
            .map(|slot| field::from_bytes_mod_order(slot))
            .collect();
        field::hash(&elements).expect("4 is within 1..=16")
    }

    pub fn flags(&self) -> u8 {
        self.index_slots[0][16]
    }

    pub fn schema_hash(&self) -> [u8; SCHEMA_HASH_SIZE] {
        let mut out = [0u8; SCHEMA_HASH_SIZE];
        out.copy_from_slice(&self.index_slots[0][0..16]);
        out
    }

    pub fn version(&self) -> u32 {
        u32::from_le_bytes(self.index_slots[0][20..24].try_into().unwrap())
    }

    pub fn revocation_nonce(&self) -> u64 {
        u64::from_le_bytes(self.index_slots[0][24..32].try_into().unwrap())
    }

    pub fn revocation_nonce_field(&self) -> Fr {
        Fr::from(self.revocation_nonce())
    }

    pub fn expiration(&self) -> Option<u64> {
        if self.flags() & FLAG_EXPIRATION != 0 {
            Some(u64::from_le_bytes(
                self.index_slots[1][0..8].try_into().unwrap(),
            ))
        } else {
            None
        }
    }

    pub fn subject_position(&self) -> SubjectPosition {
        match self.flags() & FLAG_SUBJECT_MASK {
            FLAG_SUBJECT_INDEX => SubjectPosition::Index,
            FLAG_SUBJECT_VALUE => SubjectPosition::Value,
            _ => SubjectPosition::None,
        }
    }

    pub fn subject_id(&self) -> Option<Identifier> {
        match self.subject_position() {
            SubjectPosition::Index => {
                let mut bytes = [0u8; IDENTIFIER_SIZE];
                bytes.copy_from_slice(&self.index_slots[2][0..IDENTIFIER_SIZE]);
                Some(Identifier::from_bytes(bytes))
            }
            SubjectPosition::Value => {
                let mut bytes = [0u8; IDENTIFIER_SIZE];
                bytes.copy_from_slice(&self.value_slots[3][0..IDENTIFIER_SIZE]);
                Some(Identifier::from_bytes(bytes))
            }
            SubjectPosition::None => None,
        }
    }
}

/// `low16(Keccak256(schema_bytes || type))`.
pub fn schema_hash(schema_bytes: &[u8], claim_type: &str) -> [u8; SCHEMA_HASH_SIZE] {
    let mut hasher = Keccak256::new();
    hasher.update(schema_bytes);
    hasher.update(claim_type.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; SCHEMA_HASH_SIZE];
    out.copy_from_slice(&digest[16..32]);
    out
}
