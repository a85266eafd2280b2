//! Baby Jubjub key handling and EdDSA-Poseidon signing.
//!
//! Baby Jubjub's base field is exactly `ark_bn254::Fr` — the field Poseidon
//! already operates over — so public-key coordinates, message digests, and
//! signature challenges all live in the same field without conversion.

use crate::field;
use ark_bn254::Fr as BaseField;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fr as ScalarField};
use ark_ff::{PrimeField, UniformRand};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use issuer_types::{IssuerError, IssuerResult};
use rand_core::OsRng;
use zeroize::Zeroize;

/// A Baby Jubjub public point, `(x, y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub x: BaseField,
    pub y: BaseField,
}

impl PublicKey {
    fn to_affine(self) -> EdwardsAffine {
        EdwardsAffine::new_unchecked(self.x, self.y)
    }
}

/// A 64-byte compressed EdDSA-Poseidon signature: 32-byte compressed `R`
/// followed by 32-byte little-endian `s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

/// Holds `sk`. Stateless after construction — safe for concurrent reads
/// from multiple threads without any internal locking.
pub struct Signer {
    sk: ScalarField,
}

impl Drop for Signer {
    fn drop(&mut self) {
        // ScalarField doesn't implement Zeroize directly; best-effort scrub
        // of the backing limbs via a throwaway representation.
        let mut limbs = self.sk.into_bigint().0;
        limbs.zeroize();
    }
}

impl Signer {
    /// Construct from a raw scalar. The scalar is reduced modulo the Baby
    /// Jubjub subgroup order, matching how the rest of the curve's
    /// arithmetic already treats it.
    pub fn from_scalar_bytes(bytes: &[u8]) -> Self {
        Self {
            sk: ScalarField::from_le_bytes_mod_order(bytes),
        }
    }

    pub fn generate() -> Self {
        Self {
            sk: ScalarField::rand(&mut OsRng),
        }
    }

    pub fn public(&self) -> PublicKey {
        let point = (EdwardsAffine::generator() * self.sk).into_affine();
        PublicKey {
            x: point.x,
            y: point.y,
        }
    }

    /// Sign a field element. Fails `NotInField` if `z >= p` — callers
    /// that already hold a validated `Fr` cannot hit this; it exists for
    /// parity with `sign_bytes`, which can.
    pub fn sign(&self, z: BaseField) -> IssuerResult<Signature> {
        field::check_in_field(&field::to_bytes(&z))?;
        Ok(self.sign_unchecked(z))
    }

    fn sign_unchecked(&self, z: BaseField) -> Signature {
        let pk = self.public();

        let sk_as_base = field::from_bytes_mod_order(&scalar_to_bytes(self.sk));
        let nonce_digest = field::hash2(sk_as_base, z);
        let r_scalar = ScalarField::from_le_bytes_mod_order(&field::to_bytes(&nonce_digest));

        let r_point = (EdwardsAffine::generator() * r_scalar).into_affine();

        let challenge_digest =
            field::hash(&[r_point.x, r_point.y, pk.x, pk.y, z]).expect("5 is within 1..=16");
        let h_scalar = ScalarField::from_le_bytes_mod_order(&field::to_bytes(&challenge_digest));

        let s_scalar = r_scalar + h_scalar * self.sk;

        let mut out = [0u8; 64];
        r_point
            .serialize_compressed(&mut out[0..32])
            .expect("Baby Jubjub affine point compresses to 32 bytes");
        s_scalar
            .serialize_compressed(&mut out[32..64])
            .expect("Baby Jubjub scalar compresses to 32 bytes");
        Signature(out)
    }

    /// Interpret `le_bytes` (at most 32 bytes) as a little-endian field
    /// element, then sign it.
    pub fn sign_bytes(&self, le_bytes: &[u8]) -> IssuerResult<Signature> {
        if le_bytes.len() > 32 {
            return Err(IssuerError::NotInField(format!(
                "expected at most 32 bytes, got {}",
                le_bytes.len()
            )));
        }
        let mut padded = [0u8; 32];
        padded[..le_bytes.len()].copy_from_slice(le_bytes);
        let z = field::check_in_field(&padded)?;
        Ok(self.sign_unchecked(z))
    }
}

fn scalar_to_bytes(s: ScalarField) -> [u8; 32] {
    let mut out = [0u8; 32];
    s.serialize_compressed(&mut out[..])
        .expect("Baby Jubjub scalar compresses to 32 bytes");
    out
}

/// Verify an EdDSA-Poseidon signature against a public key and message.
pub fn verify(pk: PublicKey, z: BaseField, sig: &Signature) -> bool {
    let r_point = match EdwardsAffine::deserialize_compressed(&sig.0[0..32]) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let s_scalar = match ScalarField::deserialize_compressed(&sig.0[32..64]) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let challenge_digest = match field::hash(&[r_point.x, r_point.y, pk.x, pk.y, z]) {
        Ok(h) => h,
        Err(_) => return false,
    };
    let h_scalar = ScalarField::from_le_bytes_mod_order(&field::to_bytes(&challenge_digest));

    let lhs: EdwardsProjective = EdwardsAffine::generator() * s_scalar;
    let rhs: EdwardsProjective = r_point + pk.to_affine() * h_scalar;

    lhs.into_affine() == rhs.into_affine()
}
