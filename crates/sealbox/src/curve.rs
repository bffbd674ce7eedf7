//! bn254 G1 helpers
//!
//! every point entering from outside goes through [`point_from_bytes`] or
//! [`validate_point`]: on curve, in the prime order subgroup, not the
//! identity. scalars are checked against the group order rather than
//! silently reduced.

use ark_bn254::{Fq, Fr, G1Affine};
use ark_ec::AffineRepr;
use ark_ff::{BigInteger, PrimeField as _};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use num_bigint::BigUint;
use sha2::{Digest, Sha512};

use crate::field::PrimeField;
use crate::{Error, Result};

/// compressed G1 point size
pub const POINT_LEN: usize = 32;

/// uncompressed G1 point size (x || y)
pub const UNCOMPRESSED_POINT_LEN: usize = 64;

/// scalar encoding size (big-endian)
pub const SCALAR_LEN: usize = 32;

const HASH_TO_CURVE_DST: &[u8] = b"sealbox:bn254-g1:try-and-increment:v1";

/// reject identity, off-curve and wrong-subgroup points
pub fn validate_point(p: &G1Affine) -> Result<()> {
    if p.infinity || !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(Error::InvalidCurvePoint);
    }
    Ok(())
}

pub fn point_to_bytes(p: &G1Affine) -> Result<[u8; POINT_LEN]> {
    let mut out = [0u8; POINT_LEN];
    p.serialize_compressed(&mut out[..])
        .map_err(|_| Error::InvalidCurvePoint)?;
    Ok(out)
}

/// decode a compressed point and validate it
pub fn point_from_bytes(bytes: &[u8]) -> Result<G1Affine> {
    if bytes.len() != POINT_LEN {
        return Err(Error::InvalidCurvePoint);
    }
    let p = G1Affine::deserialize_compressed_unchecked(bytes)
        .map_err(|_| Error::InvalidCurvePoint)?;
    validate_point(&p)?;
    Ok(p)
}

/// like [`point_from_bytes`], but the identity is also accepted
pub fn point_or_identity_from_bytes(bytes: &[u8]) -> Result<G1Affine> {
    if bytes.len() != POINT_LEN {
        return Err(Error::InvalidCurvePoint);
    }
    let p = G1Affine::deserialize_compressed_unchecked(bytes)
        .map_err(|_| Error::InvalidCurvePoint)?;
    if !p.is_zero() {
        validate_point(&p)?;
    }
    Ok(p)
}

/// decode an uncompressed point (x || y) and validate it
///
/// unlike the compressed form this can carry an off-curve pair, which is
/// rejected here before any arithmetic.
pub fn point_from_uncompressed(bytes: &[u8]) -> Result<G1Affine> {
    if bytes.len() != UNCOMPRESSED_POINT_LEN {
        return Err(Error::InvalidCurvePoint);
    }
    let p = G1Affine::deserialize_uncompressed_unchecked(bytes)
        .map_err(|_| Error::InvalidCurvePoint)?;
    validate_point(&p)?;
    Ok(p)
}

pub fn point_to_uncompressed(p: &G1Affine) -> Result<[u8; UNCOMPRESSED_POINT_LEN]> {
    let mut out = [0u8; UNCOMPRESSED_POINT_LEN];
    p.serialize_uncompressed(&mut out[..])
        .map_err(|_| Error::InvalidCurvePoint)?;
    Ok(out)
}

/// group order r as a big integer
pub fn curve_order() -> BigUint {
    PrimeField::bn254().modulus().clone()
}

/// scalar from an integer in [0, r)
pub fn scalar_from_biguint(v: &BigUint) -> Result<Fr> {
    if v >= &curve_order() {
        return Err(Error::InvalidScalar);
    }
    Ok(Fr::from_be_bytes_mod_order(&v.to_bytes_be()))
}

pub fn scalar_to_biguint(s: &Fr) -> BigUint {
    BigUint::from_bytes_be(&s.into_bigint().to_bytes_be())
}

/// canonical big-endian scalar decoding
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Fr> {
    if bytes.len() != SCALAR_LEN {
        return Err(Error::InvalidScalar);
    }
    scalar_from_biguint(&BigUint::from_bytes_be(bytes))
}

pub fn scalar_to_bytes(s: &Fr) -> [u8; SCALAR_LEN] {
    let raw = s.into_bigint().to_bytes_be();
    let mut out = [0u8; SCALAR_LEN];
    out[SCALAR_LEN - raw.len()..].copy_from_slice(&raw);
    out
}

/// hash arbitrary bytes to a scalar (512-bit digest, negligible bias)
pub fn hash_to_scalar(domain: &[u8], data: &[u8]) -> Fr {
    let digest = Sha512::new()
        .chain_update((domain.len() as u32).to_be_bytes())
        .chain_update(domain)
        .chain_update(data)
        .finalize();
    Fr::from_be_bytes_mod_order(&digest)
}

/// deterministic hash to G1 by try-and-increment
///
/// x = SHA-512(dst || seed || counter) mod q, the sign of y is taken from the
/// digest's last bit, and the counter advances until x lands on the curve.
/// bn254 G1 has cofactor 1 so every curve point is in the subgroup. the
/// output's discrete log relative to any other generator is unknown.
pub fn hash_to_curve(seed: &[u8]) -> G1Affine {
    let mut counter: u32 = 0;
    loop {
        let digest = Sha512::new()
            .chain_update(HASH_TO_CURVE_DST)
            .chain_update((seed.len() as u32).to_be_bytes())
            .chain_update(seed)
            .chain_update(counter.to_be_bytes())
            .finalize();
        let x = Fq::from_be_bytes_mod_order(&digest);
        let greatest = digest[63] & 1 == 1;
        if let Some(p) = G1Affine::get_point_from_x_unchecked(x, greatest) {
            if !p.is_zero() {
                return p;
            }
        }
        counter = counter.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;
    use ark_ff::{One, UniformRand};

    #[test]
    fn test_identity_only_where_allowed() {
        let zero = G1Affine::zero();
        let bytes = point_to_bytes(&zero).unwrap();
        assert!(matches!(point_from_bytes(&bytes), Err(Error::InvalidCurvePoint)));
        assert_eq!(point_or_identity_from_bytes(&bytes).unwrap(), zero);

        let g = G1Affine::generator();
        let bytes = point_to_bytes(&g).unwrap();
        assert_eq!(point_or_identity_from_bytes(&bytes).unwrap(), g);
        assert!(point_or_identity_from_bytes(&[0xff; POINT_LEN]).is_err());
    }

    #[test]
    fn test_hash_to_curve_is_valid_and_deterministic() {
        let a = hash_to_curve(b"seed-a");
        let b = hash_to_curve(b"seed-b");
        assert!(validate_point(&a).is_ok());
        assert!(validate_point(&b).is_ok());
        assert_ne!(a, b);
        assert_eq!(a, hash_to_curve(b"seed-a"));
    }

    #[test]
    fn test_point_roundtrip_bytes() {
        let p = hash_to_curve(b"roundtrip");
        let bytes = point_to_bytes(&p).unwrap();
        assert_eq!(point_from_bytes(&bytes).unwrap(), p);

        let raw = point_to_uncompressed(&p).unwrap();
        assert_eq!(point_from_uncompressed(&raw).unwrap(), p);
    }

    #[test]
    fn test_rejects_identity() {
        let zero = G1Affine::zero();
        assert!(matches!(validate_point(&zero), Err(Error::InvalidCurvePoint)));

        let mut bytes = [0u8; POINT_LEN];
        zero.serialize_compressed(&mut bytes[..]).unwrap();
        assert!(matches!(point_from_bytes(&bytes), Err(Error::InvalidCurvePoint)));
    }

    #[test]
    fn test_rejects_off_curve() {
        let p = G1Affine::generator();
        let off = G1Affine::new_unchecked(p.x, p.y + Fq::one());
        assert!(matches!(validate_point(&off), Err(Error::InvalidCurvePoint)));

        let mut raw = [0u8; UNCOMPRESSED_POINT_LEN];
        off.serialize_uncompressed(&mut raw[..]).unwrap();
        assert!(matches!(point_from_uncompressed(&raw), Err(Error::InvalidCurvePoint)));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(point_from_bytes(&[0u8; 31]).is_err());
        assert!(point_from_bytes(&[0u8; 33]).is_err());
        assert!(point_from_uncompressed(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_rejects_garbage_x() {
        // most random x values are not on the curve; none may slip through
        let mut rejected = 0;
        for i in 0..64u8 {
            let mut bytes = [i; POINT_LEN];
            bytes[31] &= 0x3f;
            match point_from_bytes(&bytes) {
                Ok(p) => assert!(validate_point(&p).is_ok()),
                Err(_) => rejected += 1,
            }
        }
        assert!(rejected > 0);
    }

    #[test]
    fn test_scalar_range_checks() {
        let order = curve_order();
        assert!(matches!(scalar_from_biguint(&order), Err(Error::InvalidScalar)));
        let max = &order - 1u32;
        let s = scalar_from_biguint(&max).unwrap();
        assert_eq!(scalar_to_biguint(&s), max);
        assert_eq!(s + Fr::one(), Fr::from(0u64));
    }

    #[test]
    fn test_scalar_bytes_roundtrip() {
        let mut rng = rand::thread_rng();
        let s = Fr::rand(&mut rng);
        assert_eq!(scalar_from_bytes(&scalar_to_bytes(&s)).unwrap(), s);
        assert!(scalar_from_bytes(&[0xff; SCALAR_LEN]).is_err());
    }

    #[test]
    fn test_hash_to_scalar_domain_separated() {
        assert_ne!(hash_to_scalar(b"a", b"data"), hash_to_scalar(b"b", b"data"));
        // length prefix stops domain/data boundary shifting
        assert_ne!(hash_to_scalar(b"ab", b"c"), hash_to_scalar(b"a", b"bc"));
    }

    #[test]
    fn test_generator_multiples_validate() {
        let g = G1Affine::generator();
        let p = (g.into_group() * Fr::from(12345u64)).into_affine();
        assert!(validate_point(&p).is_ok());
    }
}
