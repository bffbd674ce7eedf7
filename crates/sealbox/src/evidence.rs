//! hide-then-reveal evidence commitments
//!
//! the owner commits to an evidence payload for a dispute and publishes only
//! the pedersen point. later it reveals the payload and blinding; anyone
//! holding the published point can check the revelation.
//!
//! ```text
//! COMMITTED ──reveal──▶ REVEALED
//!     │
//!     └──window elapsed──▶ EXPIRED
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::{info, warn};

use ark_bn254::Fr;

use crate::curve;
use crate::encoding::hex_bytes;
use crate::pedersen::{Commitment, Opening, PedersenParams};
use crate::{Error, Result};

const EVIDENCE_DOMAIN: &[u8] = b"sealbox:evidence:v1";

/// evidence lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceState {
    Committed,
    Revealed,
    Expired,
}

/// what the owner publishes at commit time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCommitment {
    pub dispute_id: String,
    pub commitment: Commitment,
}

/// what the owner discloses at reveal time
#[derive(Clone, Serialize, Deserialize)]
pub struct Revelation {
    pub dispute_id: String,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    pub opening: Opening,
}

impl std::fmt::Debug for Revelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revelation")
            .field("dispute_id", &self.dispute_id)
            .field("len", &self.value.len())
            .finish_non_exhaustive()
    }
}

/// scalar committed to for a dispute's evidence bytes
pub fn evidence_scalar(dispute_id: &str, value: &[u8]) -> Fr {
    let mut data = Vec::with_capacity(4 + dispute_id.len() + value.len());
    data.extend_from_slice(&(dispute_id.len() as u32).to_be_bytes());
    data.extend_from_slice(dispute_id.as_bytes());
    data.extend_from_slice(value);
    curve::hash_to_scalar(EVIDENCE_DOMAIN, &data)
}

/// verifier check: does `revelation` open `published`
pub fn verify_revelation(
    params: &PedersenParams,
    published: &PublishedCommitment,
    revelation: &Revelation,
) -> Result<()> {
    if published.dispute_id != revelation.dispute_id {
        return Err(Error::RevealMismatch);
    }
    let expected = evidence_scalar(&revelation.dispute_id, &revelation.value);
    let value_ok: bool = curve::scalar_to_bytes(&expected)
        .ct_eq(&curve::scalar_to_bytes(&revelation.opening.value))
        .into();
    let point_ok = params.open(&published.commitment, &revelation.opening);
    if !(value_ok & point_ok) {
        warn!(dispute = %published.dispute_id, "binding violation: revelation does not open commitment");
        return Err(Error::RevealMismatch);
    }
    Ok(())
}

struct Entry {
    value: Vec<u8>,
    opening: Opening,
    published: PublishedCommitment,
    state: EvidenceState,
    deadline: Instant,
}

/// owner-side store of openings plus verifier-side acceptance
pub struct EvidenceManager {
    params: PedersenParams,
    reveal_window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl EvidenceManager {
    pub fn new(params: PedersenParams, reveal_window: Duration) -> Self {
        Self {
            params,
            reveal_window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &PedersenParams {
        &self.params
    }

    /// commit to `value` with a fresh blinding and return the public part
    ///
    /// each dispute id can be committed once.
    pub fn commit_evidence(&self, dispute_id: &str, value: &[u8]) -> Result<PublishedCommitment> {
        if dispute_id.is_empty() {
            return Err(Error::Malformed("empty dispute id"));
        }
        let mut entries = self.entries.lock().map_err(|e| Error::Storage(e.to_string()))?;
        if entries.contains_key(dispute_id) {
            return Err(Error::DuplicateDispute(dispute_id.to_string()));
        }

        let scalar = evidence_scalar(dispute_id, value);
        let (commitment, opening) = self.params.commit_random(scalar, &mut rand::thread_rng());
        let published = PublishedCommitment {
            dispute_id: dispute_id.to_string(),
            commitment,
        };
        entries.insert(
            dispute_id.to_string(),
            Entry {
                value: value.to_vec(),
                opening,
                published: published.clone(),
                state: EvidenceState::Committed,
                deadline: Instant::now() + self.reveal_window,
            },
        );

        info!(dispute = dispute_id, "committed evidence");
        Ok(published)
    }

    /// the published commitment for a dispute
    pub fn published(&self, dispute_id: &str) -> Result<PublishedCommitment> {
        let entries = self.entries.lock().map_err(|e| Error::Storage(e.to_string()))?;
        entries
            .get(dispute_id)
            .map(|e| e.published.clone())
            .ok_or_else(|| Error::UnknownDispute(dispute_id.to_string()))
    }

    pub fn state(&self, dispute_id: &str) -> Result<EvidenceState> {
        let mut entries = self.entries.lock().map_err(|e| Error::Storage(e.to_string()))?;
        let entry = entries
            .get_mut(dispute_id)
            .ok_or_else(|| Error::UnknownDispute(dispute_id.to_string()))?;
        expire_if_due(dispute_id, entry, Instant::now());
        Ok(entry.state)
    }

    /// disclose value and blinding; only from `Committed` within the window
    pub fn reveal(&self, dispute_id: &str) -> Result<Revelation> {
        let mut entries = self.entries.lock().map_err(|e| Error::Storage(e.to_string()))?;
        let entry = entries
            .get_mut(dispute_id)
            .ok_or_else(|| Error::UnknownDispute(dispute_id.to_string()))?;
        expire_if_due(dispute_id, entry, Instant::now());

        match entry.state {
            EvidenceState::Committed => {}
            EvidenceState::Revealed => {
                return Err(Error::InvalidState(format!("{dispute_id}: already revealed")))
            }
            EvidenceState::Expired => {
                return Err(Error::InvalidState(format!("{dispute_id}: reveal window closed")))
            }
        }

        entry.state = EvidenceState::Revealed;
        info!(dispute = dispute_id, "revealed evidence");
        Ok(Revelation {
            dispute_id: dispute_id.to_string(),
            value: entry.value.clone(),
            opening: entry.opening.clone(),
        })
    }

    /// verifier side: check a revelation against a published commitment
    pub fn accept_revelation(
        &self,
        published: &PublishedCommitment,
        revelation: &Revelation,
    ) -> Result<()> {
        verify_revelation(&self.params, published, revelation)?;
        info!(dispute = %published.dispute_id, "accepted revelation");
        Ok(())
    }

    /// move every committed entry past its window to `Expired`
    pub fn expire_overdue(&self) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|e| Error::Storage(e.to_string()))?;
        let mut expired: Vec<String> = entries
            .iter_mut()
            .filter_map(|(id, entry)| expire_if_due(id, entry, now).then(|| id.clone()))
            .collect();
        expired.sort();
        Ok(expired)
    }
}

/// returns true when this call performed the transition
fn expire_if_due(dispute_id: &str, entry: &mut Entry, now: Instant) -> bool {
    if entry.state == EvidenceState::Committed && now >= entry.deadline {
        entry.state = EvidenceState::Expired;
        entry.value.clear();
        warn!(dispute = dispute_id, "evidence expired unrevealed");
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;

    fn manager(window_secs: u64) -> EvidenceManager {
        EvidenceManager::new(PedersenParams::new(), Duration::from_secs(window_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_reveal_accept() {
        let owner = manager(60);
        let published = owner.commit_evidence("d-1", b"invoice #42: 1200 EUR").unwrap();
        assert_eq!(owner.state("d-1").unwrap(), EvidenceState::Committed);
        assert_eq!(owner.published("d-1").unwrap(), published);

        let revelation = owner.reveal("d-1").unwrap();
        assert_eq!(revelation.value, b"invoice #42: 1200 EUR");
        assert_eq!(owner.state("d-1").unwrap(), EvidenceState::Revealed);

        let verifier = manager(60);
        verifier.accept_revelation(&published, &revelation).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_revealed_is_terminal() {
        let owner = manager(60);
        owner.commit_evidence("d-1", b"x").unwrap();
        owner.reveal("d-1").unwrap();
        assert!(matches!(owner.reveal("d-1"), Err(Error::InvalidState(_))));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(owner.state("d-1").unwrap(), EvidenceState::Revealed);
        assert!(owner.expire_overdue().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_detected() {
        let owner = manager(60);
        let published = owner.commit_evidence("d-1", b"original").unwrap();
        let revelation = owner.reveal("d-1").unwrap();

        let mut forged = revelation.clone();
        forged.value = b"altered".to_vec();
        assert!(matches!(
            verify_revelation(owner.params(), &published, &forged),
            Err(Error::RevealMismatch)
        ));

        // payload intact, committed scalar swapped
        let mut forged = revelation.clone();
        forged.opening.value = evidence_scalar("d-1", b"altered");
        assert!(matches!(
            verify_revelation(owner.params(), &published, &forged),
            Err(Error::RevealMismatch)
        ));

        let mut forged = revelation.clone();
        forged.opening.blinding += Fr::one();
        assert!(matches!(
            verify_revelation(owner.params(), &published, &forged),
            Err(Error::RevealMismatch)
        ));

        let mut forged = revelation;
        forged.dispute_id = "d-2".into();
        assert!(matches!(
            verify_revelation(owner.params(), &published, &forged),
            Err(Error::RevealMismatch)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let owner = manager(30);
        owner.commit_evidence("early", b"a").unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        owner.commit_evidence("late", b"b").unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(owner.expire_overdue().unwrap(), vec!["early".to_string()]);
        assert_eq!(owner.state("early").unwrap(), EvidenceState::Expired);
        assert!(matches!(owner.reveal("early"), Err(Error::InvalidState(_))));

        // still inside its own window
        owner.reveal("late").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_after_window_expires_lazily() {
        let owner = manager(5);
        owner.commit_evidence("d", b"payload").unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(owner.reveal("d"), Err(Error::InvalidState(_))));
        assert_eq!(owner.state("d").unwrap(), EvidenceState::Expired);
    }

    #[test]
    fn test_commit_once_per_dispute() {
        let owner = manager(60);
        owner.commit_evidence("d", b"one").unwrap();
        assert!(matches!(
            owner.commit_evidence("d", b"two"),
            Err(Error::DuplicateDispute(_))
        ));
        assert!(matches!(owner.reveal("missing"), Err(Error::UnknownDispute(_))));
    }

    #[test]
    fn test_scalar_bound_to_dispute() {
        assert_ne!(evidence_scalar("a", b"v"), evidence_scalar("b", b"v"));
        assert_ne!(evidence_scalar("ab", b"c"), evidence_scalar("a", b"bc"));
    }

    #[test]
    fn test_revelation_serde() {
        let owner = manager(60);
        let published = owner.commit_evidence("d", b"json me").unwrap();
        let revelation = owner.reveal("d").unwrap();

        let published: PublishedCommitment =
            serde_json::from_str(&serde_json::to_string(&published).unwrap()).unwrap();
        let revelation: Revelation =
            serde_json::from_str(&serde_json::to_string(&revelation).unwrap()).unwrap();
        verify_revelation(owner.params(), &published, &revelation).unwrap();
    }
}
