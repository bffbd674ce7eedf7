//! threshold key escrow
//!
//! ```text
//! distribute:  secret ─split─▶ shares ─ecies(holder pk, aad = dispute)─▶ envelopes
//!                        └─feldman─▶ public commitments (bn254 field only)
//! deposit:     envelope ─▶ custodian (retry on transient failure)
//! recover:     custodians ─release_share─▶ verify ─▶ t valid shares ─▶ reconstruct
//! ```
//!
//! the secret itself is never stored. the registry keeps, per dispute, the
//! threshold parameters, which holder got which index, and the feldman
//! commitments. recovery holds the dispute's lock for its whole duration.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::custodian::{self, Custodian};
use crate::retry::{with_retry, RetryPolicy};
use crate::shamir::{self, KeyShare, Secret, ThresholdConfig};
use crate::viewing::{self, EncryptedData, KeyPurpose, ViewingPublicKey};
use crate::vss::{self, ShareCommitments};
use crate::{Error, Result};

const ENVELOPE_AAD_PREFIX: &[u8] = b"sealbox:escrow:v1:";

/// maximum holder id length
pub const MAX_HOLDER_ID_LEN: usize = 64;

/// share holder identity, usable as a path component
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HolderId(String);

impl HolderId {
    /// ascii letters, digits, `-` and `_`, at most 64 chars
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let ok = !id.is_empty()
            && id.len() <= MAX_HOLDER_ID_LEN
            && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !ok {
            return Err(Error::Config(format!("invalid holder id: {id:?}")));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HolderId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<HolderId> for String {
    fn from(id: HolderId) -> Self {
        id.0
    }
}

/// a party that holds one share
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareHolder {
    pub id: HolderId,
    /// escrow-purpose viewing key the share is encrypted to
    pub public_key: ViewingPublicKey,
}

/// one holder's encrypted share
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscrowEnvelope {
    pub dispute_id: String,
    pub holder: HolderId,
    /// x-coordinate of the enclosed share
    pub index: u32,
    pub data: EncryptedData,
}

/// associated data binding an envelope to its dispute
pub(crate) fn envelope_aad(dispute_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(ENVELOPE_AAD_PREFIX.len() + dispute_id.len());
    aad.extend_from_slice(ENVELOPE_AAD_PREFIX);
    aad.extend_from_slice(dispute_id.as_bytes());
    aad
}

/// lifecycle of an escrowed secret
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    /// shares distributed, secret not reconstructed
    Escrowed,
    /// secret reconstructed at least once
    Recovered,
}

/// public bookkeeping for one escrowed secret
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub dispute_id: String,
    pub threshold: ThresholdConfig,
    /// which share index each holder was given
    pub assignments: BTreeMap<HolderId, u32>,
    /// feldman commitments, present when the field is bn254
    pub commitments: Option<ShareCommitments>,
    pub state: EscrowState,
}

impl EscrowRecord {
    /// check a returned share before it is counted
    fn check_share(&self, holder: &HolderId, share: &KeyShare) -> Result<()> {
        match self.assignments.get(holder) {
            Some(&index) if index == share.index => {}
            _ => return Err(Error::ShareVerificationFailed),
        }
        if share.field != self.threshold.field {
            return Err(Error::InconsistentField);
        }
        if share.threshold != self.threshold.threshold {
            return Err(Error::InconsistentThreshold);
        }
        if let Some(commitments) = &self.commitments {
            commitments.verify_share(share)?;
        }
        Ok(())
    }
}

/// output of [`EscrowManager::distribute`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Distribution {
    pub record: EscrowRecord,
    pub envelopes: Vec<EscrowEnvelope>,
}

/// per-dispute escrow registry and recovery orchestration
pub struct EscrowManager {
    registry: Mutex<HashMap<String, Arc<tokio::sync::Mutex<EscrowRecord>>>>,
    retry: RetryPolicy,
}

impl Default for EscrowManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl EscrowManager {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// split `secret` and encrypt one share to each holder
    ///
    /// `holders[i]` receives share index `i + 1`. the dispute is registered
    /// in state `Escrowed`.
    pub fn distribute(
        &self,
        dispute_id: &str,
        secret: &Secret,
        holders: &[ShareHolder],
        config: &ThresholdConfig,
    ) -> Result<Distribution> {
        config.validate()?;
        if dispute_id.is_empty() {
            return Err(Error::Malformed("empty dispute id"));
        }
        if holders.len() != config.shares as usize {
            return Err(Error::InvalidThreshold {
                t: config.threshold,
                n: holders.len() as u32,
            });
        }
        let mut seen = BTreeSet::new();
        for holder in holders {
            if !seen.insert(&holder.id) {
                return Err(Error::DuplicateHolder(holder.id.to_string()));
            }
            if holder.public_key.purpose() != KeyPurpose::Escrow {
                return Err(Error::Config(format!("{}: not an escrow key", holder.id)));
            }
        }
        if self.lookup(dispute_id)?.is_some() {
            return Err(Error::DuplicateDispute(dispute_id.to_string()));
        }

        let (shares, commitments) = if config.field.is_bn254() {
            let (shares, commitments) = vss::split_verifiable(secret, config)?;
            (shares, Some(commitments))
        } else {
            (shamir::split(secret, config)?, None)
        };

        let aad = envelope_aad(dispute_id);
        let mut envelopes = Vec::with_capacity(holders.len());
        let mut assignments = BTreeMap::new();
        for (holder, share) in holders.iter().zip(&shares) {
            let plaintext = Zeroizing::new(share.to_bytes()?);
            let data = viewing::encrypt_with_aad(&plaintext, &holder.public_key, KeyPurpose::Escrow, &aad)?;
            assignments.insert(holder.id.clone(), share.index);
            envelopes.push(EscrowEnvelope {
                dispute_id: dispute_id.to_string(),
                holder: holder.id.clone(),
                index: share.index,
                data,
            });
        }

        let record = EscrowRecord {
            dispute_id: dispute_id.to_string(),
            threshold: config.clone(),
            assignments,
            commitments,
            state: EscrowState::Escrowed,
        };
        self.register(record.clone())?;

        info!(
            dispute = dispute_id,
            t = config.threshold,
            n = config.shares,
            verifiable = record.commitments.is_some(),
            "escrowed secret"
        );
        Ok(Distribution { record, envelopes })
    }

    /// import a record produced elsewhere (e.g. by another process's distribute)
    pub fn register(&self, record: EscrowRecord) -> Result<()> {
        record.threshold.validate()?;
        let mut registry = self.registry.lock().map_err(|e| Error::Storage(e.to_string()))?;
        if registry.contains_key(&record.dispute_id) {
            return Err(Error::DuplicateDispute(record.dispute_id));
        }
        registry.insert(
            record.dispute_id.clone(),
            Arc::new(tokio::sync::Mutex::new(record)),
        );
        Ok(())
    }

    /// snapshot of a dispute's record, waiting out any running recovery
    pub async fn record(&self, dispute_id: &str) -> Result<EscrowRecord> {
        let entry = self.entry(dispute_id)?;
        let record = entry.lock().await;
        Ok(record.clone())
    }

    pub async fn state(&self, dispute_id: &str) -> Result<EscrowState> {
        Ok(self.record(dispute_id).await?.state)
    }

    /// hand each envelope to the custodian serving its holder
    pub async fn deposit(
        &self,
        distribution: &Distribution,
        custodians: &[Arc<dyn Custodian>],
    ) -> Result<()> {
        let jobs = distribution
            .envelopes
            .iter()
            .map(|envelope| {
                let custodian = custodian::find(custodians, &envelope.holder).map(Arc::clone);
                let retry = self.retry;
                async move {
                    let custodian = custodian?;
                    with_retry(&retry, "deposit", || custodian.deposit(envelope)).await
                }
            })
            .collect::<Vec<_>>();

        for result in futures::future::join_all(jobs).await {
            result?;
        }
        info!(
            dispute = %distribution.record.dispute_id,
            custodians = distribution.envelopes.len(),
            "deposited envelopes"
        );
        Ok(())
    }

    /// collect shares until `t` verify or `timeout` passes, then reconstruct
    ///
    /// custodians are queried concurrently. a share that fails verification
    /// is dropped and recovery keeps going with the rest.
    pub async fn recover(
        &self,
        dispute_id: &str,
        custodians: &[Arc<dyn Custodian>],
        timeout: Duration,
    ) -> Result<Secret> {
        let entry = self.entry(dispute_id)?;
        let mut record = entry.lock().await;
        let deadline = Instant::now() + timeout;
        let need = record.threshold.threshold as usize;

        let mut pending = custodians
            .iter()
            .filter(|c| record.assignments.contains_key(&c.holder_id()))
            .map(|c| {
                let custodian = Arc::clone(c);
                let dispute = dispute_id.to_string();
                let retry = self.retry;
                async move {
                    let holder = custodian.holder_id();
                    let result =
                        with_retry(&retry, "release share", || custodian.release_share(&dispute)).await;
                    (holder, result)
                }
            })
            .collect::<FuturesUnordered<_>>();

        let mut valid: Vec<KeyShare> = Vec::with_capacity(need);
        let mut indices = BTreeSet::new();
        while valid.len() < need {
            let (holder, result) = match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(_) => {
                    warn!(dispute = dispute_id, have = valid.len(), need, "recovery timed out");
                    break;
                }
            };

            match result.and_then(|share| record.check_share(&holder, &share).map(|_| share)) {
                Ok(share) if indices.insert(share.index) => {
                    debug!(dispute = dispute_id, holder = %holder, index = share.index, "accepted share");
                    valid.push(share);
                }
                Ok(share) => {
                    warn!(dispute = dispute_id, holder = %holder, index = share.index, "duplicate share index");
                }
                Err(e) if e.is_transient() => {
                    warn!(dispute = dispute_id, holder = %holder, "custodian unavailable: {e}");
                }
                Err(e) => {
                    warn!(dispute = dispute_id, holder = %holder, "rejected share: {e}");
                }
            }
        }

        if valid.len() < need {
            return Err(Error::InsufficientShares {
                have: valid.len(),
                need,
            });
        }

        let secret = shamir::reconstruct(&valid)?;
        if let Some(commitments) = &record.commitments {
            if !vss::verify_secret(commitments, &secret) {
                return Err(Error::ShareVerificationFailed);
            }
        }

        record.state = EscrowState::Recovered;
        info!(dispute = dispute_id, shares = valid.len(), "recovered secret");
        Ok(secret)
    }

    /// drop a dispute from the registry and ask its custodians to discard envelopes
    ///
    /// the registry entry is removed even if a custodian fails; the first
    /// such failure is returned so the caller knows an envelope may remain.
    pub async fn forget(&self, dispute_id: &str, custodians: &[Arc<dyn Custodian>]) -> Result<()> {
        let entry = self.entry(dispute_id)?;
        let record = entry.lock().await;

        let mut first_err = None;
        for holder in record.assignments.keys() {
            let outcome = match custodian::find(custodians, holder) {
                Ok(c) => with_retry(&self.retry, "discard", || c.discard(dispute_id)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(dispute = dispute_id, holder = %holder, "discard failed: {e}");
                first_err.get_or_insert(e);
            }
        }

        self.registry
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?
            .remove(dispute_id);
        info!(dispute = dispute_id, "forgot escrow");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lookup(&self, dispute_id: &str) -> Result<Option<Arc<tokio::sync::Mutex<EscrowRecord>>>> {
        let registry = self.registry.lock().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(registry.get(dispute_id).cloned())
    }

    fn entry(&self, dispute_id: &str) -> Result<Arc<tokio::sync::Mutex<EscrowRecord>>> {
        self.lookup(dispute_id)?
            .ok_or_else(|| Error::UnknownDispute(dispute_id.to_string()))
    }
}
