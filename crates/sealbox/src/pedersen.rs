//! pedersen commitments over bn254 G1
//!
//! ```text
//! C = v*G + b*H
//! ```
//!
//! G and H are hashed to the curve from fixed seeds, so nobody knows
//! log_G(H). hiding is perfect given a uniform blinding b, binding holds
//! under discrete log. commitments add: C(v1,b1) + C(v2,b2) = C(v1+v2, b1+b2).

use std::fmt;

use ark_bn254::{Fr, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup};
use ark_std::UniformRand;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::curve::{self, POINT_LEN};
use crate::encoding::{self, CurveId, Reader, TAG_COMMITMENT};
use crate::{Error, Result};

/// seed for the value generator G
pub const GENERATOR_G_SEED: &[u8] = b"sealbox:pedersen:bn254:G:v1";

/// seed for the blinding generator H
pub const GENERATOR_H_SEED: &[u8] = b"sealbox:pedersen:bn254:H:v1";

/// encoded commitment size: version, tag, curve id, compressed point
pub const COMMITMENT_LEN: usize = 3 + POINT_LEN;

/// the two commitment generators
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PedersenParams {
    g: G1Affine,
    h: G1Affine,
}

impl PedersenParams {
    /// derive G and H from the documented seeds
    pub fn new() -> Self {
        Self {
            g: curve::hash_to_curve(GENERATOR_G_SEED),
            h: curve::hash_to_curve(GENERATOR_H_SEED),
        }
    }

    pub fn g(&self) -> &G1Affine {
        &self.g
    }

    pub fn h(&self) -> &G1Affine {
        &self.h
    }

    /// v*G + b*H
    pub fn commit(&self, value: &Fr, blinding: &Fr) -> Commitment {
        Commitment(self.point(value, blinding).into_affine())
    }

    /// commit to integers, rejecting anything outside [0, r)
    pub fn commit_biguint(&self, value: &BigUint, blinding: &BigUint) -> Result<Commitment> {
        let v = curve::scalar_from_biguint(value)?;
        let b = curve::scalar_from_biguint(blinding)?;
        Ok(self.commit(&v, &b))
    }

    /// commit with a fresh blinding, returning the opening alongside
    pub fn commit_random<R: RngCore + CryptoRng>(
        &self,
        value: Fr,
        rng: &mut R,
    ) -> (Commitment, Opening) {
        let blinding = Fr::rand(rng);
        let commitment = self.commit(&value, &blinding);
        (commitment, Opening { value, blinding })
    }

    /// recompute and compare in constant time
    pub fn verify(&self, commitment: &Commitment, value: &Fr, blinding: &Fr) -> bool {
        let expected = self.point(value, blinding).into_affine();
        match (curve::point_to_bytes(&expected), curve::point_to_bytes(&commitment.0)) {
            (Ok(a), Ok(b)) => a.ct_eq(&b).into(),
            _ => false,
        }
    }

    pub fn open(&self, commitment: &Commitment, opening: &Opening) -> bool {
        self.verify(commitment, &opening.value, &opening.blinding)
    }

    fn point(&self, value: &Fr, blinding: &Fr) -> G1Projective {
        self.g.into_group() * value + self.h.into_group() * blinding
    }
}

impl Default for PedersenParams {
    fn default() -> Self {
        Self::new()
    }
}

/// a published commitment point
///
/// deserialized commitments are always validated; locally computed ones may
/// only be the identity for a zero opening, which never occurs with a
/// random blinding.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Commitment(G1Affine);

impl Commitment {
    /// wrap an externally supplied point after validation
    pub fn from_point(point: G1Affine) -> Result<Self> {
        curve::validate_point(&point)?;
        Ok(Self(point))
    }

    pub fn point(&self) -> &G1Affine {
        &self.0
    }

    /// homomorphic addition
    pub fn combine(&self, other: &Commitment) -> Commitment {
        Commitment((self.0.into_group() + other.0.into_group()).into_affine())
    }

    /// `[version]['C'][curve id][32-byte compressed point]`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(COMMITMENT_LEN);
        encoding::header(&mut out, TAG_COMMITMENT);
        out.push(CurveId::Bn254G1 as u8);
        out.extend_from_slice(&curve::point_to_bytes(&self.0)?);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        r.header(TAG_COMMITMENT)?;
        if CurveId::from_byte(r.u8()?)? != CurveId::Bn254G1 {
            return Err(Error::Malformed("commitment is not on bn254 G1"));
        }
        let point = curve::point_from_bytes(r.bytes(POINT_LEN)?)?;
        r.finish()?;
        Ok(Self(point))
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::Malformed("invalid hex"))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match curve::point_to_bytes(&self.0) {
            Ok(bytes) => write!(f, "Commitment({})", hex::encode(bytes)),
            Err(_) => write!(f, "Commitment(<identity>)"),
        }
    }
}

impl Serialize for Commitment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let hex = self.to_hex().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Commitment::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// the secret side of a commitment: value and blinding
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    #[serde(with = "hex_scalar")]
    pub value: Fr,
    #[serde(with = "hex_scalar")]
    pub blinding: Fr,
}

impl fmt::Debug for Opening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opening").finish_non_exhaustive()
    }
}

/// canonical big-endian hex for scalars, range checked on the way in
pub mod hex_scalar {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::curve;

    pub fn serialize<S>(s: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(curve::scalar_to_bytes(s)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        curve::scalar_from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
