//! custodians hold encrypted key shares between distribution and recovery
//!
//! a custodian is the runtime side of a [`ShareHolder`]: it accepts the
//! envelope addressed to its holder and, on request, hands back the
//! decrypted share. two backends:
//! - local: holder key and envelopes in a directory on disk
//! - remote: a custodian service over http (`network` feature)
//!
//! which one is used is fixed by [`CustodianConfig`] when the context is built.

pub mod local;

#[cfg(feature = "network")]
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CustodianConfig;
use crate::escrow::{EscrowEnvelope, HolderId, ShareHolder};
use crate::shamir::KeyShare;
use crate::{Error, Result};

pub use local::LocalCustodian;
#[cfg(feature = "network")]
pub use remote::RemoteCustodian;

/// pluggable share custodian
#[async_trait]
pub trait Custodian: Send + Sync {
    /// identity and public key shares are encrypted to
    fn share_holder(&self) -> ShareHolder;

    fn holder_id(&self) -> HolderId {
        self.share_holder().id
    }

    /// store an envelope addressed to this holder
    async fn deposit(&self, envelope: &EscrowEnvelope) -> Result<()>;

    /// decrypt and return this holder's share for a dispute
    async fn release_share(&self, dispute_id: &str) -> Result<KeyShare>;

    /// destroy this holder's envelope for a dispute
    async fn discard(&self, dispute_id: &str) -> Result<()>;
}

/// build the configured custodian set
pub async fn from_config(config: &CustodianConfig) -> Result<Vec<Arc<dyn Custodian>>> {
    match config {
        CustodianConfig::Local { dir, holders } => {
            let mut out: Vec<Arc<dyn Custodian>> = Vec::with_capacity(holders.len());
            for holder in holders {
                let id = HolderId::new(holder)?;
                out.push(Arc::new(LocalCustodian::open(dir, id).await?));
            }
            Ok(out)
        }
        #[cfg(feature = "network")]
        CustodianConfig::Remote { nodes, request_timeout_secs } => {
            let timeout = std::time::Duration::from_secs(*request_timeout_secs);
            let mut out: Vec<Arc<dyn Custodian>> = Vec::with_capacity(nodes.len());
            for node in nodes {
                out.push(Arc::new(RemoteCustodian::from_node(node, timeout)?));
            }
            Ok(out)
        }
        #[cfg(not(feature = "network"))]
        CustodianConfig::Remote { .. } => Err(Error::Config(
            "remote custodians need the `network` feature".into(),
        )),
    }
}

/// find the custodian serving `holder`
pub fn find<'a>(custodians: &'a [Arc<dyn Custodian>], holder: &HolderId) -> Result<&'a Arc<dyn Custodian>> {
    custodians
        .iter()
        .find(|c| &c.holder_id() == holder)
        .ok_or_else(|| Error::UnknownHolder(holder.to_string()))
}
