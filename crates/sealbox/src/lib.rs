//! # sealbox
//!
//! privacy primitives for dispute resolution: threshold key escrow,
//! binding evidence commitments, purpose-scoped viewing keys and a
//! timing-decorrelation queue for what finally gets disclosed.
//!
//! ## architecture
//!
//! ```text
//!  dispute payload
//!        │
//!        ├──────────────────────┬──────────────────────────┐
//!        ▼                      ▼                          ▼
//!  ┌────────────┐       ┌───────────────┐         ┌────────────────┐
//!  │  viewing   │       │   evidence    │         │     escrow     │
//!  │ ecies to a │       │ pedersen over │         │ shamir t-of-n  │
//!  │ purpose key│       │   bn254 g1    │         │ + feldman vss  │
//!  └─────┬──────┘       └───────┬───────┘         └───────┬────────┘
//!        │                      │ commit now,             │ one envelope
//!        │                      │ reveal later            │ per holder
//!        ▼                      ▼                         ▼
//!  ┌──────────────────────────────────┐          ┌──┐ ┌──┐ ┌──┐
//!  │           batch queue            │          │c1│ │c2│ │c3│  custodians
//!  │ min size / max delay, shuffled   │          └──┘ └──┘ └──┘
//!  └────────────────┬─────────────────┘            any t recover
//!                   ▼
//!             released batches
//! ```
//!
//! ## security properties
//!
//! - fewer than t shares reveal nothing about an escrowed secret
//! - shares are checked against public commitments before they count
//! - an evidence commitment cannot be opened to a different value
//! - a ciphertext decrypts only under the key and purpose it was made for,
//!   and every decryption failure looks the same
//! - batch release order is independent of submission order
//!
//! ## usage
//!
//! ```rust,ignore
//! use sealbox::{config::SealboxConfig, shamir::Secret, Sealbox};
//!
//! let config = SealboxConfig::load("sealbox.toml".as_ref())?;
//! let sealbox = Sealbox::from_config(config).await?;
//!
//! // escrow a dispute key with the configured custodians
//! sealbox.escrow_secret("dispute-7", &Secret::from(1234)).await?;
//!
//! // later, any t of them can bring it back
//! let secret = sealbox.recover_secret("dispute-7").await?;
//! ```

pub mod batch;
pub mod config;
pub mod context;
pub mod curve;
pub mod custodian;
pub mod encoding;
pub mod error;
pub mod escrow;
pub mod evidence;
pub mod field;
pub mod pedersen;
pub mod retry;
pub mod shamir;
pub mod viewing;
pub mod vss;

pub use batch::{Batch, BatchConfig, BatchQueue, SubmissionKind, SubmissionStatus};
pub use config::SealboxConfig;
pub use context::Sealbox;
pub use custodian::{Custodian, LocalCustodian};
pub use error::{Error, Result};
pub use escrow::{EscrowManager, HolderId, ShareHolder};
pub use evidence::EvidenceManager;
pub use field::PrimeField;
pub use pedersen::{Commitment, PedersenParams};
pub use shamir::{reconstruct, split, KeyShare, Secret, ThresholdConfig};
pub use viewing::{derive_key, EncryptedData, KeyPurpose, ViewingKey, ViewingPublicKey};
pub use vss::{split_verifiable, ShareCommitments};

#[cfg(feature = "network")]
pub use custodian::RemoteCustodian;
