//! file-backed custodian
//!
//! layout under the configured directory:
//!
//! ```text
//! <dir>/<holder>/key.json             escrow viewing key (secret scalar, hex)
//! <dir>/<holder>/<hex dispute>.json   one envelope per dispute
//! ```
//!
//! writes go to a temp file and are renamed into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::Custodian;
use crate::escrow::{envelope_aad, EscrowEnvelope, HolderId, ShareHolder};
use crate::shamir::KeyShare;
use crate::viewing::{KeyPurpose, ViewingKey};
use crate::{Error, Result};

const KEY_FILE: &str = "key.json";

#[derive(Serialize, Deserialize)]
struct KeyFile {
    holder: HolderId,
    purpose: KeyPurpose,
    secret: String,
}

/// custodian keeping its key and envelopes in a local directory
pub struct LocalCustodian {
    root: PathBuf,
    id: HolderId,
    key: ViewingKey,
}

impl LocalCustodian {
    /// generate a fresh escrow key for `id` and write it under `dir`
    ///
    /// refuses to overwrite an existing key file.
    pub async fn create(dir: &Path, id: HolderId) -> Result<Self> {
        let root = dir.join(id.as_str());
        let path = root.join(KEY_FILE);
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::Storage(format!("key already exists: {}", path.display())));
        }

        let key = ViewingKey::generate(KeyPurpose::Escrow, &mut rand::thread_rng());
        let file = KeyFile {
            holder: id.clone(),
            purpose: KeyPurpose::Escrow,
            secret: hex::encode(*key.secret_bytes()),
        };
        let json = Zeroizing::new(
            serde_json::to_vec_pretty(&file).map_err(|e| Error::Storage(e.to_string()))?,
        );
        tokio::fs::create_dir_all(&root).await?;
        write_atomic(&path, &json).await?;

        info!(holder = %id, "created custodian key");
        Ok(Self { root, id, key })
    }

    /// load an existing custodian from `dir`
    pub async fn open(dir: &Path, id: HolderId) -> Result<Self> {
        let root = dir.join(id.as_str());
        let raw = Zeroizing::new(tokio::fs::read(root.join(KEY_FILE)).await?);
        let file: KeyFile =
            serde_json::from_slice(&raw).map_err(|e| Error::Storage(format!("key file: {e}")))?;
        if file.holder != id {
            return Err(Error::UnknownHolder(file.holder.to_string()));
        }
        if file.purpose != KeyPurpose::Escrow {
            return Err(Error::Config(format!("{id}: key is not an escrow key")));
        }

        let secret = Zeroizing::new(hex::decode(&file.secret).map_err(|_| Error::InvalidScalar)?);
        let bytes: [u8; 32] = secret.as_slice().try_into().map_err(|_| Error::InvalidScalar)?;
        let key = ViewingKey::from_secret_bytes(KeyPurpose::Escrow, bytes)?;

        debug!(holder = %id, "opened custodian");
        Ok(Self { root, id, key })
    }

    /// custodian over an in-memory key (nothing written until first deposit)
    pub fn with_key(dir: &Path, id: HolderId, key: ViewingKey) -> Result<Self> {
        if key.purpose() != KeyPurpose::Escrow {
            return Err(Error::Config(format!("{id}: key is not an escrow key")));
        }
        Ok(Self {
            root: dir.join(id.as_str()),
            id,
            key,
        })
    }

    fn envelope_path(&self, dispute_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(dispute_id.as_bytes())))
    }
}

#[async_trait]
impl Custodian for LocalCustodian {
    fn share_holder(&self) -> ShareHolder {
        ShareHolder {
            id: self.id.clone(),
            public_key: self.key.public_key(),
        }
    }

    fn holder_id(&self) -> HolderId {
        self.id.clone()
    }

    async fn deposit(&self, envelope: &EscrowEnvelope) -> Result<()> {
        if envelope.holder != self.id {
            return Err(Error::UnknownHolder(envelope.holder.to_string()));
        }
        let json = serde_json::to_vec_pretty(envelope).map_err(|e| Error::Storage(e.to_string()))?;
        tokio::fs::create_dir_all(&self.root).await?;
        write_atomic(&self.envelope_path(&envelope.dispute_id), &json).await?;
        debug!(holder = %self.id, dispute = %envelope.dispute_id, "stored envelope");
        Ok(())
    }

    async fn release_share(&self, dispute_id: &str) -> Result<KeyShare> {
        let raw = tokio::fs::read(self.envelope_path(dispute_id)).await?;
        let envelope: EscrowEnvelope =
            serde_json::from_slice(&raw).map_err(|e| Error::Storage(format!("envelope: {e}")))?;
        if envelope.dispute_id != dispute_id || envelope.holder != self.id {
            return Err(Error::Malformed("envelope filed under the wrong dispute"));
        }

        let plaintext = Zeroizing::new(
            self.key
                .decrypt_with_aad(&envelope.data, &envelope_aad(dispute_id))?,
        );
        let share = KeyShare::from_bytes(&plaintext)?;
        if share.index != envelope.index {
            return Err(Error::Malformed("share index does not match envelope"));
        }
        Ok(share)
    }

    async fn discard(&self, dispute_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.envelope_path(dispute_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowManager;
    use crate::field::PrimeField;
    use crate::shamir::{Secret, ThresholdConfig};
    use crate::viewing;

    fn holder(name: &str) -> HolderId {
        HolderId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let created = LocalCustodian::create(dir.path(), holder("alice")).await.unwrap();
        let opened = LocalCustodian::open(dir.path(), holder("alice")).await.unwrap();
        assert_eq!(created.share_holder().public_key, opened.share_holder().public_key);

        // second create must not clobber the key
        assert!(LocalCustodian::create(dir.path(), holder("alice")).await.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalCustodian::open(dir.path(), holder("nobody")).await;
        assert!(matches!(err, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_deposit_release_discard() {
        let dir = tempfile::tempdir().unwrap();
        let custodian = LocalCustodian::create(dir.path(), holder("bob")).await.unwrap();

        let manager = EscrowManager::default();
        let config = ThresholdConfig::new(1, 1, PrimeField::bn254()).unwrap();
        let distribution = manager
            .distribute("d-1", &Secret::from(77), &[custodian.share_holder()], &config)
            .unwrap();

        custodian.deposit(&distribution.envelopes[0]).await.unwrap();
        let share = custodian.release_share("d-1").await.unwrap();
        assert_eq!(share.index, 1);
        assert_eq!(crate::shamir::reconstruct(&[share]).unwrap(), Secret::from(77));

        custodian.discard("d-1").await.unwrap();
        assert!(matches!(custodian.release_share("d-1").await, Err(Error::Storage(_))));
        // idempotent
        custodian.discard("d-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_foreign_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let bob = LocalCustodian::create(dir.path(), holder("bob")).await.unwrap();
        let carol = LocalCustodian::create(dir.path(), holder("carol")).await.unwrap();

        let manager = EscrowManager::default();
        let config = ThresholdConfig::new(1, 1, PrimeField::bn254()).unwrap();
        let distribution = manager
            .distribute("d-2", &Secret::from(5), &[carol.share_holder()], &config)
            .unwrap();

        assert!(matches!(
            bob.deposit(&distribution.envelopes[0]).await,
            Err(Error::UnknownHolder(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_envelope_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let custodian = LocalCustodian::create(dir.path(), holder("dave")).await.unwrap();

        let manager = EscrowManager::default();
        let config = ThresholdConfig::new(1, 1, PrimeField::bn254()).unwrap();
        let mut distribution = manager
            .distribute("d-3", &Secret::from(9), &[custodian.share_holder()], &config)
            .unwrap();
        distribution.envelopes[0].data.ciphertext[0] ^= 1;

        custodian.deposit(&distribution.envelopes[0]).await.unwrap();
        assert!(matches!(custodian.release_share("d-3").await, Err(Error::Decryption)));
    }

    #[test]
    fn test_with_key_requires_escrow_purpose() {
        let dir = tempfile::tempdir().unwrap();
        let key = viewing::ViewingKey::generate(KeyPurpose::Audit, &mut rand::thread_rng());
        assert!(LocalCustodian::with_key(dir.path(), holder("erin"), key).is_err());
    }
}
