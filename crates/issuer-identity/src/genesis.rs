use issuer_crypto::field;
use issuer_crypto::Fr;
use issuer_types::{Identifier, IDENTIFIER_SIZE};

/// Default type tag used for identities minted by this engine — there is
/// only one identity kind, so this is a fixed constant rather than a
/// registry lookup.
pub const DEFAULT_TYPE_TAG: [u8; 2] = [0x00, 0x00];

/// Schema bytes and claim type used to derive the auth claim's schema hash.
/// Fixed so genesis is reproducible without an external schema fetch for
/// the one claim the core itself constructs.
pub const AUTH_SCHEMA_BYTES: &[u8] = b"iden3-core-auth-bjj-credential-v1";
pub const AUTH_SCHEMA_TYPE: &str = "AuthBJJCredential";

/// Derives the genesis identifier from the type tag and the state hash
/// computed immediately after the auth claim is inserted.
///
/// Layout: `type_tag` (2 bytes, big-endian) `||` the low-order 27 bytes of
/// `state_hash`'s canonical little-endian encoding `||` a 2-byte
/// little-endian checksum (the bytewise sum of the preceding 29 bytes,
/// modulo 2^16). See `DESIGN.md`'s "Open Question decisions" for why this
/// exact byte mapping was chosen.
pub fn derive_identifier(type_tag: [u8; 2], state_hash: Fr) -> Identifier {
    let state_bytes = field::to_bytes(&state_hash);

    let mut out = [0u8; IDENTIFIER_SIZE];
    out[0..2].copy_from_slice(&type_tag);
    out[2..29].copy_from_slice(&state_bytes[0..27]);

    let checksum: u16 = out[0..29]
        .iter()
        .fold(0u16, |acc, &byte| acc.wrapping_add(byte as u16));
    out[29..31].copy_from_slice(&checksum.to_le_bytes());

    Identifier::from_bytes(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let state_hash = Fr::from(42u64);
        let a = derive_identifier(DEFAULT_TYPE_TAG, state_hash);
        let b = derive_identifier(DEFAULT_TYPE_TAG, state_hash);
        assert_eq!(a, b);
    }

    #[test]
    fn different_state_hash_changes_identifier() {
        let a = derive_identifier(DEFAULT_TYPE_TAG, Fr::from(1u64));
        let b = derive_identifier(DEFAULT_TYPE_TAG, Fr::from(2u64));
        assert_ne!(a, b);
    }

    #[test]
    fn type_tag_is_embedded_verbatim() {
        let id = derive_identifier([0x01, 0x02], Fr::from(7u64));
        assert_eq!(id.type_tag(), [0x01, 0x02]);
    }

    #[test]
    fn checksum_matches_sum_of_preceding_bytes() {
        let id = derive_identifier(DEFAULT_TYPE_TAG, Fr::from(99u64));
        let bytes = id.as_bytes();
        let expected: u16 = bytes[0..29]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        let checksum = u16::from_le_bytes([bytes[29], bytes[30]]);
        assert_eq!(checksum, expected);
    }
}
