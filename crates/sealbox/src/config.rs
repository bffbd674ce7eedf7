//! sealbox configuration (toml)
//!
//! ```toml
//! [threshold]
//! threshold = 2
//! shares = 3
//!
//! [recovery]
//! timeout_secs = 30
//!
//! [batch]
//! min_batch_size = 5
//! max_delay_secs = 30
//!
//! [custodian]
//! backend = "local"
//! dir = "/var/lib/sealbox"
//! holders = ["alice", "bob", "carol"]
//! ```
//!
//! every section is optional; missing values fall back to [`Default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;
use crate::escrow::HolderId;
use crate::field::PrimeField;
use crate::retry::RetryPolicy;
use crate::shamir::ThresholdConfig;
use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SealboxConfig {
    pub threshold: ThresholdSection,
    pub recovery: RecoverySection,
    pub batch: BatchSection,
    pub evidence: EvidenceSection,
    pub custodian: CustodianConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdSection {
    /// shares needed to recover
    pub threshold: u32,
    /// shares issued, one per holder
    pub shares: u32,
    /// prime modulus as hex; the bn254 scalar field when omitted
    pub field: PrimeField,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            threshold: 2,
            shares: 3,
            field: PrimeField::bn254(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoverySection {
    /// overall bound on share collection
    pub timeout_secs: u64,
    /// attempts per custodian for transient failures
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    pub min_batch_size: usize,
    pub max_delay_secs: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            min_batch_size: 5,
            max_delay_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvidenceSection {
    /// how long a commitment may stay unrevealed before it expires
    pub reveal_window_secs: u64,
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            reveal_window_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// which custodian backend serves the share holders
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum CustodianConfig {
    /// keys and envelopes under `dir/<holder>/`
    Local { dir: PathBuf, holders: Vec<String> },
    /// http custodian services
    Remote {
        nodes: Vec<RemoteNode>,
        #[serde(default = "default_request_timeout")]
        request_timeout_secs: u64,
    },
}

impl Default for CustodianConfig {
    fn default() -> Self {
        CustodianConfig::Local {
            dir: PathBuf::from("sealbox-custodians"),
            holders: vec!["custodian-1".into(), "custodian-2".into(), "custodian-3".into()],
        }
    }
}

impl CustodianConfig {
    /// holder ids in share-index order
    pub fn holder_ids(&self) -> Vec<&str> {
        match self {
            CustodianConfig::Local { holders, .. } => holders.iter().map(String::as_str).collect(),
            CustodianConfig::Remote { nodes, .. } => nodes.iter().map(|n| n.holder.as_str()).collect(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteNode {
    pub holder: String,
    pub url: String,
    /// the holder's escrow public key, hex
    pub public_key: String,
}

impl SealboxConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SealboxConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// check cross-section invariants
    pub fn validate(&self) -> Result<()> {
        self.threshold_config()?;

        let holders = self.custodian.holder_ids();
        if holders.len() != self.threshold.shares as usize {
            return Err(Error::Config(format!(
                "{} custodians configured for {} shares",
                holders.len(),
                self.threshold.shares
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for holder in holders {
            HolderId::new(holder)?;
            if !seen.insert(holder) {
                return Err(Error::DuplicateHolder(holder.to_string()));
            }
        }

        if self.recovery.timeout_secs == 0 {
            return Err(Error::Config("recovery.timeout_secs must be positive".into()));
        }
        if self.recovery.max_attempts == 0 {
            return Err(Error::Config("recovery.max_attempts must be at least 1".into()));
        }
        if self.evidence.reveal_window_secs == 0 {
            return Err(Error::Config("evidence.reveal_window_secs must be positive".into()));
        }
        self.batch_config().validate()
    }

    pub fn threshold_config(&self) -> Result<ThresholdConfig> {
        ThresholdConfig::new(
            self.threshold.threshold,
            self.threshold.shares,
            self.threshold.field.clone(),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.recovery.max_attempts,
            initial_backoff: Duration::from_millis(self.recovery.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.recovery.max_backoff_ms),
        }
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery.timeout_secs)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            min_batch_size: self.batch.min_batch_size,
            max_delay: Duration::from_secs(self.batch.max_delay_secs),
        }
    }

    pub fn reveal_window(&self) -> Duration {
        Duration::from_secs(self.evidence.reveal_window_secs)
    }
}
