//! wire formats and serde helpers
//!
//! every artifact handed to another party starts with a two byte header:
//!
//! ```text
//! [format version][artifact tag] ...
//! ```
//!
//! followed by a curve or field identifier, so a verifier running with
//! different parameters rejects the artifact instead of mis-parsing it.
//! variable length fields are length-prefixed (big-endian).

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// current format version for all artifacts
pub const FORMAT_VERSION: u8 = 1;

pub(crate) const TAG_COMMITMENT: u8 = b'C';
pub(crate) const TAG_SHARE: u8 = b'S';
pub(crate) const TAG_ENVELOPE: u8 = b'E';
pub(crate) const TAG_SHARE_COMMITMENTS: u8 = b'V';

/// curve identifier carried by point encodings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CurveId {
    /// bn254 G1, pedersen commitments and feldman vss
    Bn254G1 = 0x01,
    /// ristretto255, viewing keys
    Ristretto255 = 0x02,
}

impl CurveId {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x01 => Ok(CurveId::Bn254G1),
            0x02 => Ok(CurveId::Ristretto255),
            _ => Err(Error::Malformed("unknown curve id")),
        }
    }
}

/// write the artifact header
pub(crate) fn header(out: &mut Vec<u8>, tag: u8) {
    out.push(FORMAT_VERSION);
    out.push(tag);
}

pub(crate) fn put_u16_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::Malformed("field too long"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// bounds-checked cursor over an encoded artifact
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// check version and tag
    pub(crate) fn header(&mut self, tag: u8) -> Result<()> {
        let version = self.u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        if self.u8()? != tag {
            return Err(Error::Malformed("unexpected artifact tag"));
        }
        Ok(())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::Malformed("truncated"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u16_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.bytes(len)
    }

    pub(crate) fn u32_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    /// trailing bytes are an error
    pub(crate) fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(Error::Malformed("trailing bytes"));
        }
        Ok(())
    }
}

/// hex serialization for byte vectors
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// hex serialization for big integers
pub mod hex_biguint {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(16))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 16)
            .ok_or_else(|| serde::de::Error::custom("invalid hex integer"))
    }
}
