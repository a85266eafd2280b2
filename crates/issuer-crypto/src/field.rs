//! Poseidon-over-BN254 hashing and canonical field-element encoding.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::{BigInteger, PrimeField};
use ark_serialize::CanonicalSerialize;
use issuer_types::{IssuerError, IssuerResult};
use std::sync::OnceLock;

const MIN_INPUTS: usize = 1;
const MAX_INPUTS: usize = 16;
const FULL_ROUNDS: u64 = 8;
const PARTIAL_ROUNDS: u64 = 57;
const ALPHA: u64 = 5;
const FIELD_BITS: u64 = 254;

/// One cached Poseidon configuration per input arity (iden3 uses a
/// distinct set of round constants for each width, rather than padding
/// every call to a single fixed arity). Indexed by `n - 1` for `n` in
/// `1..=MAX_INPUTS`.
static CONFIGS: [OnceLock<PoseidonConfig<Fr>>; MAX_INPUTS] = [
    OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new(),
    OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new(),
    OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new(),
    OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new(),
];

fn config_for_arity(n_inputs: usize) -> &'static PoseidonConfig<Fr> {
    let rate = n_inputs;
    CONFIGS[n_inputs - 1].get_or_init(|| {
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            FIELD_BITS,
            rate,
            FULL_ROUNDS,
            PARTIAL_ROUNDS,
            0,
        );
        PoseidonConfig {
            full_rounds: FULL_ROUNDS as usize,
            partial_rounds: PARTIAL_ROUNDS as usize,
            alpha: ALPHA,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

/// Hash `1..=16` field elements with the Iden3 Poseidon parameter set.
/// Returns `DomainOverflow` outside that range.
pub fn hash(elements: &[Fr]) -> IssuerResult<Fr> {
    if elements.is_empty() || elements.len() > MAX_INPUTS {
        return Err(IssuerError::DomainOverflow(elements.len()));
    }
    let config = config_for_arity(elements.len());
    let mut sponge = PoseidonSponge::new(config);
    for e in elements {
        sponge.absorb(e);
    }
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    Ok(out[0])
}

pub fn hash2(left: Fr, right: Fr) -> Fr {
    hash(&[left, right]).expect("2 is within 1..=16")
}

/// Reject values `>= p`. `bytes` must be exactly 32 bytes, little-endian.
pub fn check_in_field(bytes: &[u8]) -> IssuerResult<Fr> {
    if bytes.len() != 32 {
        return Err(IssuerError::NotInField(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(bytes);
    let candidate = Fr::from_le_bytes_mod_order(&arr);
    // Canonical iff re-encoding the reduced value reproduces the input —
    // `from_le_bytes_mod_order` silently reduces mod p, so a non-canonical
    // input (>= p) would otherwise pass silently.
    let mut re_encoded = [0u8; 32];
    candidate
        .serialize_compressed(&mut re_encoded[..])
        .map_err(|e| IssuerError::Internal(e.to_string()))?;
    if re_encoded != arr {
        return Err(IssuerError::NotInField(hex::encode(arr)));
    }
    Ok(candidate)
}

/// Canonical 32-byte little-endian encoding of a field element.
pub fn to_bytes(f: &Fr) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    f.serialize_compressed(&mut bytes[..])
        .expect("BN254 Fr always serializes to 32 bytes");
    bytes
}

/// Decode 32 canonical little-endian bytes into a field element,
/// rejecting values `>= p`.
pub fn from_bytes(bytes: &[u8; 32]) -> IssuerResult<Fr> {
    check_in_field(bytes)
}

/// Reduce arbitrary bytes mod `p` without rejecting non-canonical input —
/// used when hashing raw claim data that is not itself a field element.
pub fn from_bytes_mod_order(bytes: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// `p`, the BN254 scalar field modulus, as a big-endian byte string —
/// exposed for error messages and bounds-checking diagnostics.
pub fn modulus_be() -> Vec<u8> {
    Fr::MODULUS.to_bytes_be()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(hash(&[a, b]).unwrap(), hash(&[a, b]).unwrap());
        assert_ne!(hash(&[a, b]).unwrap(), hash(&[b, a]).unwrap());
    }

    #[test]
    fn hash_rejects_out_of_range_arity() {
        assert!(hash(&[]).is_err());
        let too_many = vec![Fr::from(1u64); 17];
        assert!(matches!(hash(&too_many), Err(IssuerError::DomainOverflow(17))));
    }

    #[test]
    fn canonical_round_trip() {
        let f = Fr::from(12345u64);
        let bytes = to_bytes(&f);
        assert_eq!(from_bytes(&bytes).unwrap(), f);
    }

    #[test]
    fn non_canonical_bytes_rejected() {
        // p's big-endian bytes, reversed to little-endian, is >= p and
        // must be rejected even though `from_le_bytes_mod_order` would
        // happily reduce it to zero.
        let mut p_bytes_be = modulus_be();
        p_bytes_be.reverse();
        let mut arr = [0u8; 32];
        let len = p_bytes_be.len().min(32);
        arr[..len].copy_from_slice(&p_bytes_be[..len]);
        assert!(check_in_field(&arr).is_err());
    }

    #[test]
    fn hash2_matches_hash_of_pair() {
        let a = Fr::from(7u64);
        let b = Fr::from(8u64);
        assert_eq!(hash2(a, b), hash(&[a, b]).unwrap());
    }
}
