//! prime field arithmetic for shamir sharing
//!
//! the modulus is a runtime value rather than a type parameter so that
//! shares can carry it and be checked for consistency at reconstruction.
//! the default field is the bn254 scalar field, which lets an escrowed
//! secret also be committed to on the pedersen curve.

use ark_ff::PrimeField as _;
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// bn254 scalar field order r
pub const BN254_SCALAR_MODULUS_HEX: &str =
    "30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001";

/// a prime field Z/pZ
///
/// construction checks primality, so holding a `PrimeField` means the
/// modulus has passed baillie-psw.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrimeField {
    modulus: BigUint,
}

impl PrimeField {
    /// create a field, rejecting composite or tiny moduli
    pub fn new(modulus: BigUint) -> Result<Self> {
        if modulus < BigUint::from(3u32) {
            return Err(Error::InvalidPrime("modulus must be at least 3".into()));
        }
        if modulus.is_even() {
            return Err(Error::InvalidPrime("modulus must be odd".into()));
        }
        if !is_probable_prime(&modulus) {
            return Err(Error::InvalidPrime("modulus is composite".into()));
        }
        Ok(Self { modulus })
    }

    /// create from a u64 prime (mostly for tests and small demos)
    pub fn from_u64(p: u64) -> Result<Self> {
        Self::new(BigUint::from(p))
    }

    /// parse a hex-encoded modulus
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches("0x");
        let modulus = BigUint::parse_bytes(s.as_bytes(), 16)
            .ok_or_else(|| Error::InvalidPrime("modulus is not valid hex".into()))?;
        Self::new(modulus)
    }

    /// the bn254 scalar field
    pub fn bn254() -> Self {
        // known prime, skip the primality test
        Self {
            modulus: ark_bn254::Fr::MODULUS.into(),
        }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// stable 8-byte identifier used in share encodings
    pub fn id(&self) -> [u8; 8] {
        let digest = Sha256::new()
            .chain_update(b"sealbox:field:v1")
            .chain_update(self.modulus.to_bytes_be())
            .finalize();
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[..8]);
        id
    }

    pub fn is_bn254(&self) -> bool {
        *self == Self::bn254()
    }

    /// true if `x` is a canonical element (x < p)
    pub fn contains(&self, x: &BigUint) -> bool {
        x < &self.modulus
    }

    pub fn reduce(&self, x: &BigUint) -> BigUint {
        x % &self.modulus
    }

    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.modulus
    }

    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let a = a % &self.modulus;
        let b = b % &self.modulus;
        (a + &self.modulus - b) % &self.modulus
    }

    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.modulus
    }

    pub fn neg(&self, a: &BigUint) -> BigUint {
        let a = a % &self.modulus;
        if a.is_zero() {
            a
        } else {
            &self.modulus - a
        }
    }

    /// multiplicative inverse via fermat, None for zero
    pub fn inv(&self, a: &BigUint) -> Option<BigUint> {
        let a = a % &self.modulus;
        if a.is_zero() {
            return None;
        }
        let exp = &self.modulus - 2u32;
        Some(a.modpow(&exp, &self.modulus))
    }

    /// uniform element of [0, p)
    pub fn random<R: RngCore + CryptoRng>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_below(&self.modulus)
    }

    /// lagrange coefficients for interpolation at x = 0
    ///
    /// uses the common denominator technique so only one inversion is
    /// needed: λ_i = ξ / d_i with ξ = Π x_j and d_i = x_i · Π_{j≠i} (x_j - x_i).
    pub fn lagrange_at_zero(&self, indices: &[u32]) -> Result<Vec<BigUint>> {
        let k = indices.len();
        if k == 0 {
            return Err(Error::InsufficientShares { have: 0, need: 1 });
        }

        let mut seen = std::collections::BTreeSet::new();
        for &idx in indices {
            if idx == 0 || !self.contains(&BigUint::from(idx)) {
                return Err(Error::InvalidShareIndex);
            }
            if !seen.insert(idx) {
                return Err(Error::DuplicateShare(idx));
            }
        }

        if k == 1 {
            return Ok(vec![BigUint::one()]);
        }

        let xs: Vec<BigUint> = indices.iter().map(|&i| BigUint::from(i)).collect();
        let xi = xs.iter().fold(BigUint::one(), |acc, x| self.mul(&acc, x));

        let d: Vec<BigUint> = (0..k)
            .map(|i| {
                (0..k)
                    .filter(|&j| j != i)
                    .fold(xs[i].clone(), |acc, j| self.mul(&acc, &self.sub(&xs[j], &xs[i])))
            })
            .collect();

        // ρ_i = Π_{j≠i} d_j via prefix/suffix products
        let mut rho = vec![BigUint::one(); k];
        for i in 1..k {
            rho[i] = self.mul(&rho[i - 1], &d[i - 1]);
        }
        let mut suffix = BigUint::one();
        for i in (0..k).rev() {
            rho[i] = self.mul(&rho[i], &suffix);
            suffix = self.mul(&suffix, &d[i]);
        }

        // distinct nonzero indices below p keep every d_i invertible
        let d_bar_inv = self.inv(&suffix).ok_or(Error::InvalidShareIndex)?;
        let delta = self.mul(&xi, &d_bar_inv);
        Ok(rho.iter().map(|r| self.mul(&delta, r)).collect())
    }
}

impl Default for PrimeField {
    fn default() -> Self {
        Self::bn254()
    }
}

impl TryFrom<String> for PrimeField {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<PrimeField> for String {
    fn from(f: PrimeField) -> String {
        f.modulus.to_str_radix(16)
    }
}

/// baillie-psw (miller-rabin base 2 plus strong lucas) after trial division
pub fn is_probable_prime(n: &BigUint) -> bool {
    glass_pumpkin::prime::check(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bn254_modulus_is_prime() {
        let f = PrimeField::bn254();
        assert!(is_probable_prime(f.modulus()));
        assert!(f.is_bn254());
        assert_eq!(f.modulus().to_str_radix(16), BN254_SCALAR_MODULUS_HEX);
    }

    #[test]
    fn test_rejects_composite() {
        assert!(matches!(PrimeField::from_u64(1), Err(Error::InvalidPrime(_))));
        assert!(matches!(PrimeField::from_u64(91), Err(Error::InvalidPrime(_))));
        assert!(matches!(PrimeField::from_u64(1024), Err(Error::InvalidPrime(_))));
        // carmichael number
        assert!(matches!(PrimeField::from_u64(561), Err(Error::InvalidPrime(_))));
        assert!(PrimeField::from_u64(97).is_ok());
        assert!(PrimeField::from_u64((1u64 << 61) - 1).is_ok());
    }

    #[test]
    fn test_arithmetic() {
        let f = PrimeField::from_u64(97).unwrap();
        let a = BigUint::from(90u32);
        let b = BigUint::from(10u32);
        assert_eq!(f.add(&a, &b), BigUint::from(3u32));
        assert_eq!(f.sub(&b, &a), BigUint::from(17u32));
        assert_eq!(f.mul(&a, &b), BigUint::from(27u32));
        assert_eq!(f.neg(&b), BigUint::from(87u32));
        assert_eq!(f.neg(&BigUint::zero()), BigUint::zero());

        for x in 1..97u32 {
            let x = BigUint::from(x);
            let inv = f.inv(&x).unwrap();
            assert_eq!(f.mul(&x, &inv), BigUint::one());
        }
        assert!(f.inv(&BigUint::zero()).is_none());
    }

    #[test]
    fn test_lagrange_two_points() {
        // Q = {1, 2}: λ_1 = 2, λ_2 = -1
        let f = PrimeField::from_u64(97).unwrap();
        let coeffs = f.lagrange_at_zero(&[1, 2]).unwrap();
        assert_eq!(coeffs[0], BigUint::from(2u32));
        assert_eq!(coeffs[1], BigUint::from(96u32));
    }

    #[test]
    fn test_lagrange_recovers_constant_term() {
        // f(x) = 1 + 2x + 3x² evaluated at {1, 3, 5}
        let f = PrimeField::bn254();
        let coeffs = f.lagrange_at_zero(&[1, 3, 5]).unwrap();
        let ys = [6u32, 34, 86].map(BigUint::from);
        let acc = coeffs
            .iter()
            .zip(ys.iter())
            .fold(BigUint::zero(), |acc, (l, y)| f.add(&acc, &f.mul(l, y)));
        assert_eq!(acc, BigUint::one());
    }

    #[test]
    fn test_lagrange_partition_of_unity() {
        let f = PrimeField::bn254();
        for k in 2..=12u32 {
            let indices: Vec<u32> = (1..=k).collect();
            let sum = f
                .lagrange_at_zero(&indices)
                .unwrap()
                .iter()
                .fold(BigUint::zero(), |acc, c| f.add(&acc, c));
            assert_eq!(sum, BigUint::one(), "k={}", k);
        }
    }

    #[test]
    fn test_lagrange_rejects_bad_indices() {
        let f = PrimeField::from_u64(11).unwrap();
        assert!(matches!(f.lagrange_at_zero(&[1, 2, 2]), Err(Error::DuplicateShare(2))));
        assert!(matches!(f.lagrange_at_zero(&[0, 1]), Err(Error::InvalidShareIndex)));
        assert!(matches!(f.lagrange_at_zero(&[1, 11]), Err(Error::InvalidShareIndex)));
        assert!(matches!(f.lagrange_at_zero(&[]), Err(Error::InsufficientShares { .. })));
    }

    #[test]
    fn test_field_id_distinguishes_moduli() {
        let a = PrimeField::from_u64(97).unwrap();
        let b = PrimeField::from_u64(101).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), PrimeField::from_u64(97).unwrap().id());
    }

    #[test]
    fn test_serde_validates_modulus() {
        let json = serde_json::to_string(&PrimeField::from_u64(97).unwrap()).unwrap();
        assert_eq!(json, "\"61\"");
        let back: PrimeField = serde_json::from_str(&json).unwrap();
        assert_eq!(back.modulus(), &BigUint::from(97u32));
        // 0x5b = 91 = 7 * 13
        assert!(serde_json::from_str::<PrimeField>("\"5b\"").is_err());
    }
}
