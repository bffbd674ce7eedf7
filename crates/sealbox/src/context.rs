//! the sealbox context
//!
//! built once at startup from [`SealboxConfig`] and passed around by
//! reference. owns every manager plus the custodian set; there is no
//! process-global state.
//!
//! ```text
//!                 ┌──────────────┐
//!   config ──────▶│   Sealbox    │
//!                 ├──────────────┤
//!                 │ escrow       │──▶ custodians (local | remote)
//!                 │ evidence     │
//!                 │ batch queue  │──▶ release loop ──▶ mpsc<Batch>
//!                 └──────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::batch::{Batch, BatchQueue, SubmissionId, SubmissionKind};
use crate::config::SealboxConfig;
use crate::custodian::{self, Custodian};
use crate::escrow::{Distribution, EscrowManager, ShareHolder};
use crate::evidence::EvidenceManager;
use crate::pedersen::PedersenParams;
use crate::shamir::{Secret, ThresholdConfig};
use crate::viewing::{self, EncryptedData, KeyPurpose, ViewingPublicKey};
use crate::{Error, Result};

pub struct Sealbox {
    config: SealboxConfig,
    threshold: ThresholdConfig,
    escrow: EscrowManager,
    evidence: EvidenceManager,
    batch: Arc<BatchQueue>,
    custodians: Vec<Arc<dyn Custodian>>,
}

impl Sealbox {
    /// validate `config` and connect to the configured custodians
    pub async fn from_config(config: SealboxConfig) -> Result<Self> {
        config.validate()?;
        let custodians = custodian::from_config(&config.custodian).await?;
        Self::with_custodians(config, custodians)
    }

    /// build over an explicit custodian set instead of the configured backend
    ///
    /// custodians are assigned share indices in the order given.
    pub fn with_custodians(
        config: SealboxConfig,
        custodians: Vec<Arc<dyn Custodian>>,
    ) -> Result<Self> {
        let threshold = config.threshold_config()?;
        if custodians.len() != threshold.shares as usize {
            return Err(Error::Config(format!(
                "{} custodians for {} shares",
                custodians.len(),
                threshold.shares
            )));
        }

        let escrow = EscrowManager::new(config.retry_policy());
        let evidence = EvidenceManager::new(PedersenParams::new(), config.reveal_window());
        let batch = Arc::new(BatchQueue::new(config.batch_config())?);

        info!(
            t = threshold.threshold,
            n = threshold.shares,
            bn254 = threshold.field.is_bn254(),
            "sealbox ready"
        );
        Ok(Self {
            config,
            threshold,
            escrow,
            evidence,
            batch,
            custodians,
        })
    }

    pub fn config(&self) -> &SealboxConfig {
        &self.config
    }

    pub fn threshold(&self) -> &ThresholdConfig {
        &self.threshold
    }

    pub fn escrow(&self) -> &EscrowManager {
        &self.escrow
    }

    pub fn evidence(&self) -> &EvidenceManager {
        &self.evidence
    }

    pub fn pedersen(&self) -> &PedersenParams {
        self.evidence.params()
    }

    pub fn batch(&self) -> &Arc<BatchQueue> {
        &self.batch
    }

    pub fn custodians(&self) -> &[Arc<dyn Custodian>] {
        &self.custodians
    }

    /// holders in share-index order
    pub fn share_holders(&self) -> Vec<ShareHolder> {
        self.custodians.iter().map(|c| c.share_holder()).collect()
    }

    /// split `secret` for a dispute and deposit one envelope per custodian
    pub async fn escrow_secret(&self, dispute_id: &str, secret: &Secret) -> Result<Distribution> {
        let distribution =
            self.escrow
                .distribute(dispute_id, secret, &self.share_holders(), &self.threshold)?;
        self.escrow.deposit(&distribution, &self.custodians).await?;
        Ok(distribution)
    }

    /// reconstruct a dispute's secret within the configured timeout
    pub async fn recover_secret(&self, dispute_id: &str) -> Result<Secret> {
        self.escrow
            .recover(dispute_id, &self.custodians, self.config.recovery_timeout())
            .await
    }

    /// drop a dispute and discard its envelopes
    pub async fn forget(&self, dispute_id: &str) -> Result<()> {
        self.escrow.forget(dispute_id, &self.custodians).await
    }

    /// encrypt a disclosure to `recipient` and queue it for batched release
    pub fn submit_disclosure(
        &self,
        plaintext: &[u8],
        recipient: &ViewingPublicKey,
        purpose: KeyPurpose,
    ) -> Result<SubmissionId> {
        let data: EncryptedData = viewing::encrypt(plaintext, recipient, purpose)?;
        self.batch.enqueue(SubmissionKind::Dispute, data.to_bytes()?)
    }

    /// queue an already-built proof for batched release
    pub fn submit_proof(&self, proof: Vec<u8>) -> Result<SubmissionId> {
        self.batch.enqueue(SubmissionKind::Proof, proof)
    }

    /// start the background release loop feeding `tx`
    pub fn start_release_loop(&self, tx: mpsc::Sender<Batch>) -> JoinHandle<()> {
        Arc::clone(&self.batch).spawn_release_loop(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custodian::LocalCustodian;
    use crate::escrow::{EscrowState, HolderId};
    use crate::viewing::ViewingKey;

    async fn local_set(dir: &std::path::Path, n: usize) -> Vec<Arc<dyn Custodian>> {
        let mut out: Vec<Arc<dyn Custodian>> = Vec::new();
        for i in 1..=n {
            let id = HolderId::new(format!("custodian-{i}")).unwrap();
            out.push(Arc::new(LocalCustodian::create(dir, id).await.unwrap()));
        }
        out
    }

    #[tokio::test]
    async fn test_from_config_opens_local_custodians() {
        let dir = tempfile::tempdir().unwrap();
        local_set(dir.path(), 3).await;

        let mut config = SealboxConfig::default();
        config.custodian = crate::config::CustodianConfig::Local {
            dir: dir.path().to_path_buf(),
            holders: vec!["custodian-1".into(), "custodian-2".into(), "custodian-3".into()],
        };
        let sealbox = Sealbox::from_config(config).await.unwrap();
        assert_eq!(sealbox.custodians().len(), 3);

        let secret = Secret::from(424_242);
        sealbox.escrow_secret("d-ctx", &secret).await.unwrap();
        assert_eq!(sealbox.recover_secret("d-ctx").await.unwrap(), secret);
        assert_eq!(sealbox.escrow().state("d-ctx").await.unwrap(), EscrowState::Recovered);

        sealbox.forget("d-ctx").await.unwrap();
        assert!(sealbox.recover_secret("d-ctx").await.is_err());
    }

    #[tokio::test]
    async fn test_from_config_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SealboxConfig::default();
        config.custodian = crate::config::CustodianConfig::Local {
            dir: dir.path().to_path_buf(),
            holders: vec!["a".into(), "b".into(), "c".into()],
        };
        assert!(Sealbox::from_config(config).await.is_err());
    }

    #[tokio::test]
    async fn test_custodian_count_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let custodians = local_set(dir.path(), 2).await;
        assert!(matches!(
            Sealbox::with_custodians(SealboxConfig::default(), custodians),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_disclosure() {
        let dir = tempfile::tempdir().unwrap();
        let sealbox =
            Sealbox::with_custodians(SealboxConfig::default(), local_set(dir.path(), 3).await)
                .unwrap();

        let auditor = ViewingKey::generate(KeyPurpose::Audit, &mut rand::thread_rng());
        let id = sealbox
            .submit_disclosure(b"ledger excerpt", &auditor.public_key(), KeyPurpose::Audit)
            .unwrap();
        assert_eq!(sealbox.batch().pending_len().unwrap(), 1);

        sealbox.submit_proof(vec![1, 2, 3]).unwrap();
        assert!(sealbox.batch().withdraw(id).unwrap());
        assert_eq!(sealbox.batch().pending_len().unwrap(), 1);
    }
}
