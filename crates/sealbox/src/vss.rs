//! feldman verifiable secret sharing over bn254 G1
//!
//! the dealer publishes C_j = a_j * G for each coefficient of the sharing
//! polynomial. a holder (or the recovering party) checks a share with
//!
//! ```text
//! y_i * G == Σ_j C_j * i^j
//! ```
//!
//! so a corrupted share is caught before it poisons reconstruction.
//! only meaningful when the sharing field is the bn254 scalar field.
//! C_0 is the identity exactly when the secret is zero; every other
//! commitment must be a valid non-identity point.

use std::fmt;

use ark_bn254::{Fr, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::curve::{self, POINT_LEN};
use crate::encoding::{self, CurveId, Reader, TAG_SHARE_COMMITMENTS};
use crate::shamir::{self, KeyShare, Polynomial, Secret, ThresholdConfig};
use crate::{Error, Result};

/// public commitments to the sharing polynomial's coefficients
#[derive(Clone, PartialEq, Eq)]
pub struct ShareCommitments {
    points: Vec<G1Affine>,
}

impl ShareCommitments {
    pub(crate) fn from_polynomial(poly: &Polynomial) -> Result<Self> {
        let g = G1Affine::generator().into_group();
        let points = poly
            .coefficients()
            .iter()
            .map(|a| curve::scalar_from_biguint(a).map(|a| (g * a).into_affine()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }

    /// wrap externally supplied commitments, validating every point
    pub fn from_points(points: Vec<G1Affine>) -> Result<Self> {
        let (secret, rest) = points
            .split_first()
            .ok_or(Error::Malformed("empty share commitments"))?;
        if !secret.is_zero() {
            curve::validate_point(secret)?;
        }
        for p in rest {
            curve::validate_point(p)?;
        }
        Ok(Self { points })
    }

    /// the threshold the polynomial was built for
    pub fn threshold(&self) -> u32 {
        self.points.len() as u32
    }

    pub fn points(&self) -> &[G1Affine] {
        &self.points
    }

    /// commitment to the secret itself, secret * G
    pub fn secret_commitment(&self) -> &G1Affine {
        &self.points[0]
    }

    /// check a share against the commitments
    pub fn verify_share(&self, share: &KeyShare) -> Result<()> {
        if !share.field.is_bn254() {
            return Err(Error::UnsupportedField);
        }
        if share.threshold != self.threshold() {
            return Err(Error::InconsistentThreshold);
        }
        if share.index == 0 {
            return Err(Error::InvalidShareIndex);
        }
        let value = curve::scalar_from_biguint(&share.value)
            .map_err(|_| Error::ShareVerificationFailed)?;

        let lhs = (G1Affine::generator().into_group() * value).into_affine();
        if lhs != self.evaluate(share.index) {
            return Err(Error::ShareVerificationFailed);
        }
        Ok(())
    }

    /// Σ C_j * x^j by horner
    fn evaluate(&self, index: u32) -> G1Affine {
        let x = Fr::from(index as u64);
        self.points
            .iter()
            .rev()
            .fold(G1Projective::zero(), |acc, c| acc * x + c.into_group())
            .into_affine()
    }

    /// `[version]['V'][curve id][u16 count][count x 32-byte compressed point]`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.points.len())
            .map_err(|_| Error::Malformed("too many commitments"))?;
        let mut out = Vec::with_capacity(5 + self.points.len() * POINT_LEN);
        encoding::header(&mut out, TAG_SHARE_COMMITMENTS);
        out.push(CurveId::Bn254G1 as u8);
        out.extend_from_slice(&count.to_be_bytes());
        for p in &self.points {
            out.extend_from_slice(&curve::point_to_bytes(p)?);
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        r.header(TAG_SHARE_COMMITMENTS)?;
        if CurveId::from_byte(r.u8()?)? != CurveId::Bn254G1 {
            return Err(Error::Malformed("share commitments are not on bn254 G1"));
        }
        let count = r.u16()? as usize;
        let points = (0..count)
            .map(|j| match j {
                0 => curve::point_or_identity_from_bytes(r.bytes(POINT_LEN)?),
                _ => curve::point_from_bytes(r.bytes(POINT_LEN)?),
            })
            .collect::<Result<Vec<_>>>()?;
        r.finish()?;
        Self::from_points(points)
    }
}

impl fmt::Debug for ShareCommitments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareCommitments")
            .field("threshold", &self.threshold())
            .finish()
    }
}

impl Serialize for ShareCommitments {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex::encode(bytes))
    }
}

impl<'de> Deserialize<'de> for ShareCommitments {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// split and publish feldman commitments to the polynomial
///
/// requires the bn254 scalar field.
pub fn split_verifiable(
    secret: &Secret,
    config: &ThresholdConfig,
) -> Result<(Vec<KeyShare>, ShareCommitments)> {
    split_verifiable_with_rng(secret, config, &mut rand::thread_rng())
}

pub(crate) fn split_verifiable_with_rng<R: RngCore + CryptoRng>(
    secret: &Secret,
    config: &ThresholdConfig,
    rng: &mut R,
) -> Result<(Vec<KeyShare>, ShareCommitments)> {
    if !config.field.is_bn254() {
        return Err(Error::UnsupportedField);
    }
    let (shares, poly) = shamir::split_with_polynomial(secret, config, rng)?;
    let commitments = ShareCommitments::from_polynomial(&poly)?;
    Ok((shares, commitments))
}

/// does `secret` match the published constant-term commitment
pub fn verify_secret(commitments: &ShareCommitments, secret: &Secret) -> bool {
    let value: &BigUint = secret.expose();
    match curve::scalar_from_biguint(value) {
        Ok(s) => (G1Affine::generator().into_group() * s).into_affine() == *commitments.secret_commitment(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::PrimeField;

    fn setup(t: u32, n: u32) -> (Secret, Vec<KeyShare>, ShareCommitments) {
        let config = ThresholdConfig::new(t, n, PrimeField::bn254()).unwrap();
        let secret = Secret::random(&config.field, &mut rand::thread_rng());
        let (shares, commitments) = split_verifiable(&secret, &config).unwrap();
        (secret, shares, commitments)
    }

    #[test]
    fn test_valid_shares_verify() {
        let (secret, shares, commitments) = setup(3, 5);
        assert_eq!(commitments.threshold(), 3);
        for share in &shares {
            assert!(commitments.verify_share(share).is_ok());
        }
        assert!(verify_secret(&commitments, &secret));
        assert_eq!(shamir::reconstruct(&shares[..3]).unwrap(), secret);
    }

    #[test]
    fn test_tampered_share_rejected() {
        let (_, shares, commitments) = setup(2, 3);
        let mut bad = shares[1].clone();
        bad.value = PrimeField::bn254().add(&bad.value, &BigUint::from(1u32));
        assert!(matches!(
            commitments.verify_share(&bad),
            Err(Error::ShareVerificationFailed)
        ));

        // right value, wrong index
        let mut moved = shares[0].clone();
        moved.index = 3;
        assert!(commitments.verify_share(&moved).is_err());
    }

    #[test]
    fn test_threshold_mismatch() {
        let (_, shares, commitments) = setup(2, 3);
        let mut share = shares[0].clone();
        share.threshold = 3;
        assert!(matches!(
            commitments.verify_share(&share),
            Err(Error::InconsistentThreshold)
        ));
    }

    #[test]
    fn test_requires_bn254() {
        let config = ThresholdConfig::new(2, 3, PrimeField::from_u64(65_537).unwrap()).unwrap();
        assert!(matches!(
            split_verifiable(&Secret::from(5), &config),
            Err(Error::UnsupportedField)
        ));
    }

    #[test]
    fn test_zero_secret() {
        for (t, n) in [(1, 1), (2, 3)] {
            let config = ThresholdConfig::new(t, n, PrimeField::bn254()).unwrap();
            let zero = Secret::from(0);
            let (shares, commitments) = split_verifiable(&zero, &config).unwrap();
            assert!(commitments.secret_commitment().is_zero());
            assert!(verify_secret(&commitments, &zero));
            assert!(!verify_secret(&commitments, &Secret::from(1)));
            for share in &shares {
                assert!(commitments.verify_share(share).is_ok());
            }
            assert_eq!(shamir::reconstruct(&shares).unwrap(), zero);

            let back = ShareCommitments::from_bytes(&commitments.to_bytes().unwrap()).unwrap();
            assert_eq!(back, commitments);
        }
    }

    #[test]
    fn test_commitments_encoding() {
        let (_, shares, commitments) = setup(3, 4);
        let bytes = commitments.to_bytes().unwrap();
        let back = ShareCommitments::from_bytes(&bytes).unwrap();
        assert_eq!(back, commitments);
        assert!(back.verify_share(&shares[2]).is_ok());

        let json = serde_json::to_string(&commitments).unwrap();
        let back: ShareCommitments = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commitments);

        let mut truncated = bytes.clone();
        truncated.pop();
        assert!(ShareCommitments::from_bytes(&truncated).is_err());
    }

    #[test]
    fn test_from_points_rejects_identity() {
        assert!(matches!(
            ShareCommitments::from_points(vec![G1Affine::generator(), G1Affine::zero()]),
            Err(Error::InvalidCurvePoint)
        ));
        assert!(ShareCommitments::from_points(vec![]).is_err());
        // only the secret commitment may be the identity
        assert!(ShareCommitments::from_points(vec![G1Affine::zero(), G1Affine::generator()]).is_ok());
    }
}
