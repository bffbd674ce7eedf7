//! shamir secret sharing over a prime field
//!
//! (t, n) threshold scheme:
//! P(x) = a_0 + a_1*x + ... + a_{t-1}*x^(t-1), a_0 = secret
//! share_i = (i, P(i)) for i in 1..=n
//!
//! reconstruction interpolates P(0) from exactly t shares and fails closed
//! on anything short of that: too few shares, repeated indices, or shares
//! issued over a different prime or threshold.

use std::collections::BTreeSet;
use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::encoding::{self, Reader};
use crate::field::PrimeField;
use crate::{Error, Result};

/// threshold parameters, fixed once shares are issued
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// shares needed to reconstruct
    pub threshold: u32,
    /// shares issued
    pub shares: u32,
    /// field all shares live in
    pub field: PrimeField,
}

impl ThresholdConfig {
    pub fn new(threshold: u32, shares: u32, field: PrimeField) -> Result<Self> {
        let config = Self { threshold, shares, field };
        config.validate()?;
        Ok(config)
    }

    /// 1 <= t <= n, and n < p so every x-coordinate is a distinct nonzero element
    pub fn validate(&self) -> Result<()> {
        let (t, n) = (self.threshold, self.shares);
        if t == 0 || t > n || !self.field.contains(&BigUint::from(n)) {
            return Err(Error::InvalidThreshold { t, n });
        }
        Ok(())
    }
}

/// a secret scalar in [0, p)
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(BigUint);

impl Secret {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    /// interpret big-endian bytes as a field element, rejecting values >= p
    pub fn from_bytes(bytes: &[u8], field: &PrimeField) -> Result<Self> {
        let value = BigUint::from_bytes_be(bytes);
        if !field.contains(&value) {
            return Err(Error::InvalidSecret);
        }
        Ok(Self(value))
    }

    /// random secret in the given field
    pub fn random<R: RngCore + CryptoRng>(field: &PrimeField, rng: &mut R) -> Self {
        Self(field.random(rng))
    }

    pub fn expose(&self) -> &BigUint {
        &self.0
    }

    /// big-endian bytes left-padded to `len`
    pub fn to_bytes_padded(&self, len: usize) -> Vec<u8> {
        let raw = self.0.to_bytes_be();
        if raw.len() >= len {
            return raw;
        }
        let mut out = vec![0u8; len - raw.len()];
        out.extend_from_slice(&raw);
        out
    }
}

impl From<u64> for Secret {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// one point on the sharing polynomial
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// x-coordinate, nonzero
    pub index: u32,
    /// y-coordinate P(index)
    #[serde(with = "crate::encoding::hex_biguint")]
    pub value: BigUint,
    /// threshold the share was issued under
    pub threshold: u32,
    /// field the share was issued over
    pub field: PrimeField,
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("field", &hex::encode(self.field.id()))
            .finish_non_exhaustive()
    }
}

impl KeyShare {
    /// `[version][tag][field id:8][threshold:4][index:4][prime:u16-prefixed][value:u16-prefixed]`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(2 + 8 + 8 + 2 * (2 + 32));
        encoding::header(&mut out, encoding::TAG_SHARE);
        out.extend_from_slice(&self.field.id());
        out.extend_from_slice(&self.threshold.to_be_bytes());
        out.extend_from_slice(&self.index.to_be_bytes());
        encoding::put_u16_prefixed(&mut out, &self.field.modulus().to_bytes_be())?;
        encoding::put_u16_prefixed(&mut out, &self.value.to_bytes_be())?;
        Ok(out)
    }

    /// decode and validate; the embedded prime must match the field id
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        r.header(encoding::TAG_SHARE)?;
        let field_id: [u8; 8] = r.array()?;
        let threshold = r.u32()?;
        let index = r.u32()?;
        let field = PrimeField::new(BigUint::from_bytes_be(r.u16_prefixed()?))?;
        let value = BigUint::from_bytes_be(r.u16_prefixed()?);
        r.finish()?;

        if field.id() != field_id {
            return Err(Error::InconsistentField);
        }
        if index == 0 || threshold == 0 || !field.contains(&value) {
            return Err(Error::Malformed("share out of range"));
        }
        Ok(Self { index, value, threshold, field })
    }
}

/// random polynomial with a fixed constant term
pub(crate) struct Polynomial {
    coefficients: Vec<BigUint>,
}

impl Polynomial {
    /// degree `degree`, constant term `secret`, other coefficients uniform
    pub(crate) fn random<R: RngCore + CryptoRng>(
        secret: &BigUint,
        degree: u32,
        field: &PrimeField,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(degree as usize + 1);
        coefficients.push(secret.clone());
        for _ in 0..degree {
            coefficients.push(field.random(rng));
        }
        Self { coefficients }
    }

    pub(crate) fn coefficients(&self) -> &[BigUint] {
        &self.coefficients
    }

    /// horner evaluation at x
    pub(crate) fn evaluate(&self, x: &BigUint, field: &PrimeField) -> BigUint {
        self.coefficients
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, c| field.add(&field.mul(&acc, x), c))
    }
}

/// split a secret into `config.shares` shares, any `config.threshold` of which recover it
pub fn split(secret: &Secret, config: &ThresholdConfig) -> Result<Vec<KeyShare>> {
    let (shares, _) = split_with_polynomial(secret, config, &mut rand::thread_rng())?;
    Ok(shares)
}

/// split and also hand back the polynomial (for feldman commitments)
pub(crate) fn split_with_polynomial<R: RngCore + CryptoRng>(
    secret: &Secret,
    config: &ThresholdConfig,
    rng: &mut R,
) -> Result<(Vec<KeyShare>, Polynomial)> {
    config.validate()?;
    if !config.field.contains(secret.expose()) {
        return Err(Error::InvalidSecret);
    }

    let poly = Polynomial::random(secret.expose(), config.threshold - 1, &config.field, rng);
    let shares = (1..=config.shares)
        .map(|i| KeyShare {
            index: i,
            value: poly.evaluate(&BigUint::from(i), &config.field),
            threshold: config.threshold,
            field: config.field.clone(),
        })
        .collect();

    Ok((shares, poly))
}

/// reconstruct the secret from at least `threshold` shares
pub fn reconstruct(shares: &[KeyShare]) -> Result<Secret> {
    let first = shares
        .first()
        .ok_or(Error::InsufficientShares { have: 0, need: 1 })?;
    let field = &first.field;
    let threshold = first.threshold;

    let mut seen = BTreeSet::new();
    for share in shares {
        if share.field != *field {
            return Err(Error::InconsistentField);
        }
        if share.threshold != threshold {
            return Err(Error::InconsistentThreshold);
        }
        if share.index == 0 || !field.contains(&BigUint::from(share.index)) {
            return Err(Error::InvalidShareIndex);
        }
        if !field.contains(&share.value) {
            return Err(Error::Malformed("share value out of field range"));
        }
        if !seen.insert(share.index) {
            return Err(Error::DuplicateShare(share.index));
        }
    }

    if threshold == 0 {
        return Err(Error::InvalidThreshold { t: 0, n: shares.len() as u32 });
    }
    if shares.len() < threshold as usize {
        return Err(Error::InsufficientShares {
            have: shares.len(),
            need: threshold as usize,
        });
    }

    interpolate_at_zero(field, &shares[..threshold as usize]).map(Secret)
}

/// raw lagrange interpolation at zero, no threshold check
pub(crate) fn interpolate_at_zero(field: &PrimeField, shares: &[KeyShare]) -> Result<BigUint> {
    let indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
    let coeffs = field.lagrange_at_zero(&indices)?;
    Ok(coeffs
        .iter()
        .zip(shares)
        .fold(BigUint::zero(), |acc, (l, s)| field.add(&acc, &field.mul(l, &s.value))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pick(shares: &[KeyShare], indices: &[u32]) -> Vec<KeyShare> {
        indices
            .iter()
            .map(|i| shares.iter().find(|s| s.index == *i).unwrap().clone())
            .collect()
    }

    #[test]
    fn test_three_of_five() {
        let config = ThresholdConfig::new(3, 5, PrimeField::bn254()).unwrap();
        let shares = split(&Secret::from(123456789), &config).unwrap();
        assert_eq!(shares.len(), 5);

        let recovered = reconstruct(&pick(&shares, &[1, 3, 5])).unwrap();
        assert_eq!(recovered, Secret::from(123456789));

        let result = reconstruct(&pick(&shares, &[1, 3]));
        assert!(matches!(result, Err(Error::InsufficientShares { have: 2, need: 3 })));
    }

    #[test]
    fn test_all_shares_and_order_independent() {
        let config = ThresholdConfig::new(3, 5, PrimeField::bn254()).unwrap();
        let secret = Secret::random(&config.field, &mut rand::thread_rng());
        let shares = split(&secret, &config).unwrap();

        assert_eq!(reconstruct(&shares).unwrap(), secret);
        assert_eq!(reconstruct(&pick(&shares, &[5, 2, 4])).unwrap(), secret);
    }

    #[test]
    fn test_one_of_one() {
        let config = ThresholdConfig::new(1, 1, PrimeField::from_u64(97).unwrap()).unwrap();
        let shares = split(&Secret::from(42), &config).unwrap();
        // degree zero polynomial: the share value is the secret itself
        assert_eq!(shares[0].value, BigUint::from(42u32));
        assert_eq!(reconstruct(&shares).unwrap(), Secret::from(42));
    }

    #[test]
    fn test_invalid_threshold() {
        let f = PrimeField::bn254();
        assert!(matches!(ThresholdConfig::new(0, 3, f.clone()), Err(Error::InvalidThreshold { .. })));
        assert!(matches!(ThresholdConfig::new(4, 3, f), Err(Error::InvalidThreshold { .. })));
        // n must stay below the modulus
        let small = PrimeField::from_u64(5).unwrap();
        assert!(matches!(ThresholdConfig::new(2, 5, small), Err(Error::InvalidThreshold { .. })));

        let bad = ThresholdConfig { threshold: 6, shares: 5, field: PrimeField::bn254() };
        assert!(matches!(split(&Secret::from(1), &bad), Err(Error::InvalidThreshold { .. })));
    }

    #[test]
    fn test_secret_out_of_range() {
        let config = ThresholdConfig::new(2, 3, PrimeField::from_u64(97).unwrap()).unwrap();
        assert!(matches!(split(&Secret::from(97), &config), Err(Error::InvalidSecret)));
        assert!(Secret::from_bytes(&[0x61], &config.field).is_err());
        assert!(Secret::from_bytes(&[0x60], &config.field).is_ok());
    }

    #[test]
    fn test_duplicate_rejected_not_deduplicated() {
        let config = ThresholdConfig::new(2, 3, PrimeField::bn254()).unwrap();
        let shares = split(&Secret::from(7), &config).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert!(matches!(reconstruct(&dup), Err(Error::DuplicateShare(1))));
    }

    #[test]
    fn test_inconsistent_prime_rejected() {
        let a = ThresholdConfig::new(2, 3, PrimeField::from_u64(97).unwrap()).unwrap();
        let b = ThresholdConfig::new(2, 3, PrimeField::from_u64(101).unwrap()).unwrap();
        let sa = split(&Secret::from(5), &a).unwrap();
        let sb = split(&Secret::from(5), &b).unwrap();
        let mixed = vec![sa[0].clone(), sb[1].clone()];
        assert!(matches!(reconstruct(&mixed), Err(Error::InconsistentField)));
    }

    #[test]
    fn test_inconsistent_threshold_rejected() {
        let f = PrimeField::bn254();
        let a = split(&Secret::from(5), &ThresholdConfig::new(2, 3, f.clone()).unwrap()).unwrap();
        let b = split(&Secret::from(5), &ThresholdConfig::new(3, 3, f).unwrap()).unwrap();
        let mixed = vec![a[0].clone(), b[1].clone(), b[2].clone()];
        assert!(matches!(reconstruct(&mixed), Err(Error::InconsistentThreshold)));
    }

    #[test]
    fn test_malformed_share_values() {
        let config = ThresholdConfig::new(2, 3, PrimeField::from_u64(97).unwrap()).unwrap();
        let mut shares = split(&Secret::from(5), &config).unwrap();
        shares[0].value = BigUint::from(200u32);
        assert!(matches!(reconstruct(&shares), Err(Error::Malformed(_))));

        let mut shares = split(&Secret::from(5), &config).unwrap();
        shares[1].index = 0;
        assert!(matches!(reconstruct(&shares), Err(Error::InvalidShareIndex)));
    }

    #[test]
    fn test_share_encoding() {
        let config = ThresholdConfig::new(2, 3, PrimeField::bn254()).unwrap();
        let shares = split(&Secret::from(99), &config).unwrap();
        let bytes = shares[2].to_bytes().unwrap();
        assert_eq!(KeyShare::from_bytes(&bytes).unwrap(), shares[2]);

        // swapping the field id must not be silently accepted
        let mut tampered = bytes.clone();
        tampered[2] ^= 0xff;
        assert!(matches!(KeyShare::from_bytes(&tampered), Err(Error::InconsistentField)));

        let mut truncated = bytes;
        truncated.pop();
        assert!(KeyShare::from_bytes(&truncated).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(reconstruct(&[]), Err(Error::InsufficientShares { have: 0, .. })));
    }

    /// below threshold, interpolation output should look uniform over the field
    #[test]
    fn test_sub_threshold_interpolation_is_uniform() {
        const P: u64 = 11;
        const TRIALS_PER_BUCKET: usize = 400;
        let field = PrimeField::from_u64(P).unwrap();
        let config = ThresholdConfig::new(3, 5, field.clone()).unwrap();
        let secret = Secret::from(7);

        let mut buckets = [0usize; P as usize];
        let trials = TRIALS_PER_BUCKET * P as usize;
        for _ in 0..trials {
            let shares = split(&secret, &config).unwrap();
            let guess = interpolate_at_zero(&field, &shares[..2]).unwrap();
            let digits = guess.to_u64_digits();
            buckets[digits.first().copied().unwrap_or(0) as usize] += 1;
        }

        // each bucket should sit near 400 (sd ~19); 6 sigma bounds
        for (value, &count) in buckets.iter().enumerate() {
            assert!(
                (285..=515).contains(&count),
                "value {} appeared {} times, expected ~{}",
                value,
                count,
                TRIALS_PER_BUCKET
            );
        }

        // chi-square with 10 degrees of freedom; 40 is far past p=0.0001
        let expected = TRIALS_PER_BUCKET as f64;
        let chi2: f64 = buckets
            .iter()
            .map(|&c| {
                let d = c as f64 - expected;
                d * d / expected
            })
            .sum();
        assert!(chi2 < 40.0, "chi-square {} too large", chi2);

        // and the public path refuses outright
        let shares = split(&secret, &config).unwrap();
        assert!(reconstruct(&shares[..2]).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_t_subset_reconstructs(
            (t, n, picks) in (1u32..=6)
                .prop_flat_map(|t| (Just(t), t..=8u32))
                .prop_flat_map(|(t, n)| {
                    let all: Vec<u32> = (1..=n).collect();
                    (Just(t), Just(n), prop::sample::subsequence(all, t as usize))
                }),
            secret in any::<u64>(),
        ) {
            let config = ThresholdConfig::new(t, n, PrimeField::bn254()).unwrap();
            let shares = split(&Secret::from(secret), &config).unwrap();
            let subset = pick(&shares, &picks);
            prop_assert_eq!(reconstruct(&subset).unwrap(), Secret::from(secret));
        }

        #[test]
        fn prop_below_threshold_fails_closed(t in 2u32..=6, secret in any::<u64>()) {
            let config = ThresholdConfig::new(t, t + 2, PrimeField::bn254()).unwrap();
            let shares = split(&Secret::from(secret), &config).unwrap();
            let result = reconstruct(&shares[..(t - 1) as usize]);
            let is_insufficient = matches!(result, Err(Error::InsufficientShares { .. }));
            prop_assert!(is_insufficient);
        }
    }
}
