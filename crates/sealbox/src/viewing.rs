//! purpose-scoped viewing keys and ecies over ristretto255
//!
//! ```text
//! root secret ──HKDF(info = purpose)──▶ viewing key (scalar, point)
//!
//! encrypt(m, pk, purpose):
//!   e ← random, E = e*B
//!   k = HKDF(e*pk || E || pk, info = purpose)
//!   ct, tag = ChaCha20-Poly1305(k, nonce, m, aad = header || caller aad)
//! ```
//!
//! keys for different purposes are independent even from one root. the
//! envelope's purpose byte is part of the aad and must match the
//! recipient's purpose, so a relabelled envelope fails like any other
//! bad tag.

use std::fmt;

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::curve;
use crate::encoding::{self, CurveId, Reader, TAG_ENVELOPE};
use crate::pedersen::{Commitment, PedersenParams};
use crate::{Error, Result};

const VIEWING_KEY_SALT: &[u8] = b"sealbox:viewing-key:v1";
const ECIES_SALT: &[u8] = b"sealbox:ecies:v1";
const KEY_COMMITMENT_DOMAIN: &[u8] = b"sealbox:key-commitment:v1";

/// minimum root secret length for derivation
pub const MIN_ROOT_SECRET_LEN: usize = 32;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const PUBLIC_KEY_LEN: usize = 32;

/// what a viewing key may decrypt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum KeyPurpose {
    /// key shares held by custodians
    Escrow = 1,
    /// evidence payloads attached to a dispute
    Evidence = 2,
    /// material released to an arbiter or counterparty
    Disclosure = 3,
    /// read-only access for auditors
    Audit = 4,
}

impl KeyPurpose {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(KeyPurpose::Escrow),
            2 => Ok(KeyPurpose::Evidence),
            3 => Ok(KeyPurpose::Disclosure),
            4 => Ok(KeyPurpose::Audit),
            _ => Err(Error::Malformed("unknown key purpose")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeyPurpose::Escrow => "escrow",
            KeyPurpose::Evidence => "evidence",
            KeyPurpose::Disclosure => "disclosure",
            KeyPurpose::Audit => "audit",
        }
    }

    fn kdf_info(&self, prefix: &str) -> Vec<u8> {
        format!("{prefix}:{}", self.label()).into_bytes()
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for KeyPurpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "escrow" => Ok(KeyPurpose::Escrow),
            "evidence" => Ok(KeyPurpose::Evidence),
            "disclosure" => Ok(KeyPurpose::Disclosure),
            "audit" => Ok(KeyPurpose::Audit),
            _ => Err(Error::Malformed("unknown key purpose")),
        }
    }
}

/// a purpose-bound ristretto255 keypair
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ViewingKey {
    #[zeroize(skip)]
    purpose: KeyPurpose,
    secret: Scalar,
    #[zeroize(skip)]
    public: RistrettoPoint,
}

impl ViewingKey {
    /// HKDF-SHA256 over the root secret with a per-purpose info string
    pub fn derive(root_secret: &[u8], purpose: KeyPurpose) -> Result<Self> {
        if root_secret.len() < MIN_ROOT_SECRET_LEN {
            return Err(Error::KeyDerivationFailed);
        }
        let hk = Hkdf::<Sha256>::new(Some(VIEWING_KEY_SALT), root_secret);
        let mut okm = Zeroizing::new([0u8; 64]);
        hk.expand(&purpose.kdf_info("sealbox:viewing-key"), &mut okm[..])
            .map_err(|_| Error::KeyDerivationFailed)?;
        let secret = Scalar::from_bytes_mod_order_wide(&okm);
        Self::from_scalar(purpose, secret)
    }

    /// fresh random key
    pub fn generate<R: RngCore + CryptoRng>(purpose: KeyPurpose, rng: &mut R) -> Self {
        let mut wide = Zeroizing::new([0u8; 64]);
        rng.fill_bytes(&mut wide[..]);
        let secret = Scalar::from_bytes_mod_order_wide(&wide);
        Self {
            purpose,
            secret,
            public: RISTRETTO_BASEPOINT_POINT * secret,
        }
    }

    /// restore from canonical secret scalar bytes
    pub fn from_secret_bytes(purpose: KeyPurpose, bytes: [u8; 32]) -> Result<Self> {
        let secret = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
            .ok_or(Error::InvalidScalar)?;
        Self::from_scalar(purpose, secret)
    }

    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    fn from_scalar(purpose: KeyPurpose, secret: Scalar) -> Result<Self> {
        if secret == Scalar::ZERO {
            return Err(Error::KeyDerivationFailed);
        }
        Ok(Self {
            purpose,
            secret,
            public: RISTRETTO_BASEPOINT_POINT * secret,
        })
    }

    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    pub fn public_key(&self) -> ViewingPublicKey {
        ViewingPublicKey {
            purpose: self.purpose,
            point: self.public,
        }
    }

    pub fn decrypt(&self, data: &EncryptedData) -> Result<Vec<u8>> {
        self.decrypt_with_aad(data, &[])
    }

    /// decrypt with caller-supplied associated data
    ///
    /// every failure returns [`Error::Decryption`] after the same work: an
    /// undecodable ephemeral point is swapped for the basepoint, a purpose
    /// mismatch is only recorded, and the full derivation and tag check
    /// still run.
    pub fn decrypt_with_aad(&self, data: &EncryptedData, aad: &[u8]) -> Result<Vec<u8>> {
        let decoded = CompressedRistretto(data.ephemeral)
            .decompress()
            .filter(|p| !p.is_identity());
        let point_ok = decoded.is_some();
        let purpose_ok = data.purpose == self.purpose;
        let ephemeral = decoded.unwrap_or(RISTRETTO_BASEPOINT_POINT);

        let shared = self.secret * ephemeral;
        let key = message_key(&shared, &data.ephemeral, &self.public, self.purpose)
            .map_err(|_| Error::Decryption)?;
        let header = header_aad(data.purpose, &data.ephemeral, &data.nonce, aad);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let mut buf = data.ciphertext.clone();
        let opened = cipher.decrypt_in_place_detached(
            Nonce::from_slice(&data.nonce),
            &header,
            &mut buf,
            Tag::from_slice(&data.tag),
        );

        if opened.is_err() || !point_ok || !purpose_ok {
            buf.zeroize();
            return Err(Error::Decryption);
        }
        Ok(buf)
    }

    /// decode and decrypt in one step; parse errors are decryption errors
    pub fn decrypt_bytes(&self, bytes: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let data = EncryptedData::from_bytes(bytes).map_err(|_| Error::Decryption)?;
        self.decrypt_with_aad(&data, aad)
    }
}

impl fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewingKey")
            .field("purpose", &self.purpose)
            .field("public", &hex::encode(self.public.compress().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// derive a viewing key for `purpose` from a root secret
pub fn derive_key(root_secret: &[u8], purpose: KeyPurpose) -> Result<ViewingKey> {
    ViewingKey::derive(root_secret, purpose)
}

/// public half of a viewing key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ViewingPublicKey {
    purpose: KeyPurpose,
    point: RistrettoPoint,
}

impl ViewingPublicKey {
    /// decode, rejecting non-canonical encodings and the identity
    pub fn from_bytes(purpose: KeyPurpose, bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| Error::InvalidCurvePoint)?;
        let point = CompressedRistretto(arr)
            .decompress()
            .filter(|p| !p.is_identity())
            .ok_or(Error::InvalidCurvePoint)?;
        Ok(Self { purpose, point })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.point.compress().to_bytes()
    }

    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// blinded pedersen commitment to this key's identity
    pub fn commit<R: RngCore + CryptoRng>(
        &self,
        params: &PedersenParams,
        rng: &mut R,
    ) -> (KeyCommitment, KeyCommitmentOpening) {
        let (commitment, opening) = params.commit_random(self.commitment_value(), rng);
        (
            KeyCommitment { commitment },
            KeyCommitmentOpening { blinding: opening.blinding },
        )
    }

    fn commitment_value(&self) -> ark_bn254::Fr {
        let mut data = Vec::with_capacity(1 + PUBLIC_KEY_LEN);
        data.push(self.purpose as u8);
        data.extend_from_slice(&self.to_bytes());
        curve::hash_to_scalar(KEY_COMMITMENT_DOMAIN, &data)
    }
}

impl fmt::Debug for ViewingPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewingPublicKey({}:{})", self.purpose, hex::encode(self.to_bytes()))
    }
}

#[derive(Serialize, Deserialize)]
struct PublicKeyRepr {
    purpose: KeyPurpose,
    key: String,
}

impl Serialize for ViewingPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PublicKeyRepr {
            purpose: self.purpose,
            key: hex::encode(self.to_bytes()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ViewingPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = PublicKeyRepr::deserialize(deserializer)?;
        let bytes = hex::decode(&repr.key).map_err(serde::de::Error::custom)?;
        ViewingPublicKey::from_bytes(repr.purpose, &bytes).map_err(serde::de::Error::custom)
    }
}

/// published commitment to a viewing public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCommitment {
    pub commitment: Commitment,
}

/// blinding needed to open a [`KeyCommitment`]
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyCommitmentOpening {
    #[serde(with = "crate::pedersen::hex_scalar")]
    pub blinding: ark_bn254::Fr,
}

impl fmt::Debug for KeyCommitmentOpening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCommitmentOpening").finish_non_exhaustive()
    }
}

impl KeyCommitment {
    /// recompute the commitment for `key` and compare in constant time
    pub fn verify(
        &self,
        params: &PedersenParams,
        key: &ViewingPublicKey,
        opening: &KeyCommitmentOpening,
    ) -> bool {
        params.verify(&self.commitment, &key.commitment_value(), &opening.blinding)
    }
}

/// an ecies envelope
///
/// the tag authenticates the whole header (version, suite, purpose,
/// ephemeral key, nonce) plus any caller associated data.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub purpose: KeyPurpose,
    #[serde(with = "hex_array")]
    pub ephemeral: [u8; PUBLIC_KEY_LEN],
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "hex_array")]
    pub tag: [u8; TAG_LEN],
    #[serde(with = "encoding::hex_bytes")]
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for EncryptedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedData")
            .field("purpose", &self.purpose)
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

impl EncryptedData {
    /// `[version]['E'][suite][purpose][32 ephemeral][12 nonce][16 tag][u32 len][ciphertext]`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = u32::try_from(self.ciphertext.len())
            .map_err(|_| Error::Malformed("ciphertext too long"))?;
        let mut out = Vec::with_capacity(4 + PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN + 4 + self.ciphertext.len());
        encoding::header(&mut out, TAG_ENVELOPE);
        out.push(CurveId::Ristretto255 as u8);
        out.push(self.purpose as u8);
        out.extend_from_slice(&self.ephemeral);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        r.header(TAG_ENVELOPE)?;
        if CurveId::from_byte(r.u8()?)? != CurveId::Ristretto255 {
            return Err(Error::Malformed("unsupported envelope suite"));
        }
        let purpose = KeyPurpose::from_byte(r.u8()?)?;
        let ephemeral = r.array()?;
        let nonce = r.array()?;
        let tag = r.array()?;
        let ciphertext = r.u32_prefixed()?.to_vec();
        r.finish()?;
        Ok(Self { purpose, ephemeral, nonce, tag, ciphertext })
    }
}

/// encrypt to a recipient under `purpose`
pub fn encrypt(
    plaintext: &[u8],
    recipient: &ViewingPublicKey,
    purpose: KeyPurpose,
) -> Result<EncryptedData> {
    encrypt_with_aad(plaintext, recipient, purpose, &[])
}

/// encrypt and bind extra associated data (not stored in the envelope)
pub fn encrypt_with_aad(
    plaintext: &[u8],
    recipient: &ViewingPublicKey,
    purpose: KeyPurpose,
    aad: &[u8],
) -> Result<EncryptedData> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = Scalar::random(&mut rng);
    let ephemeral = (RISTRETTO_BASEPOINT_POINT * ephemeral_secret).compress().to_bytes();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let shared = ephemeral_secret * recipient.point;
    let key = message_key(&shared, &ephemeral, &recipient.point, purpose)
        .map_err(|_| Error::Encryption)?;
    let header = header_aad(purpose, &ephemeral, &nonce, aad);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), &header, &mut ciphertext)
        .map_err(|_| Error::Encryption)?;
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(EncryptedData {
        purpose,
        ephemeral,
        nonce,
        tag: tag_bytes,
        ciphertext,
    })
}

fn message_key(
    shared: &RistrettoPoint,
    ephemeral: &[u8; PUBLIC_KEY_LEN],
    recipient: &RistrettoPoint,
    purpose: KeyPurpose,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(3 * PUBLIC_KEY_LEN));
    ikm.extend_from_slice(shared.compress().as_bytes());
    ikm.extend_from_slice(ephemeral);
    ikm.extend_from_slice(recipient.compress().as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(ECIES_SALT), &ikm);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&purpose.kdf_info("sealbox:ecies"), &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed)?;
    Ok(key)
}

fn header_aad(
    purpose: KeyPurpose,
    ephemeral: &[u8; PUBLIC_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + PUBLIC_KEY_LEN + NONCE_LEN + aad.len());
    encoding::header(&mut out, TAG_ENVELOPE);
    out.push(CurveId::Ristretto255 as u8);
    out.push(purpose as u8);
    out.extend_from_slice(ephemeral);
    out.extend_from_slice(nonce);
    out.extend_from_slice(aad);
    out
}

/// hex for fixed-size byte arrays
mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("wrong length"))
    }
}
