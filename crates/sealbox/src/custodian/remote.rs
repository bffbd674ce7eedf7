//! http custodian client
//!
//! ```text
//! POST   {url}/escrow/{dispute}         envelope json
//! GET    {url}/escrow/{dispute}/share   {"share": hex(KeyShare::to_bytes)}
//! DELETE {url}/escrow/{dispute}
//! ```
//!
//! the remote side holds the escrow secret key; shares arrive decrypted
//! over the transport, so nodes should be reached over tls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::Custodian;
use crate::config::RemoteNode;
use crate::escrow::{EscrowEnvelope, HolderId, ShareHolder};
use crate::shamir::KeyShare;
use crate::viewing::{KeyPurpose, ViewingPublicKey};
use crate::{Error, Result};

/// release response from a custodian node
#[derive(Serialize, Deserialize)]
pub struct ReleaseResponse {
    /// hex of the share's binary encoding
    pub share: String,
}

pub struct RemoteCustodian {
    holder: ShareHolder,
    url: String,
    http: reqwest::Client,
}

impl RemoteCustodian {
    pub fn new(holder: ShareHolder, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            holder,
            url: url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_node(node: &RemoteNode, timeout: Duration) -> Result<Self> {
        let id = HolderId::new(&node.holder)?;
        let key = hex::decode(&node.public_key)
            .map_err(|_| Error::Config(format!("{id}: public key is not hex")))?;
        let public_key = ViewingPublicKey::from_bytes(KeyPurpose::Escrow, &key)?;
        Self::new(ShareHolder { id, public_key }, node.url.clone(), timeout)
    }

    fn endpoint(&self, dispute_id: &str) -> String {
        format!("{}/escrow/{}", self.url, hex::encode(dispute_id.as_bytes()))
    }

    fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        status_result(&self.holder.id, resp.status())?;
        Ok(resp)
    }
}

/// 5xx and 429 are worth retrying; any other failure status is not
fn status_result(holder: &HolderId, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(Error::Unavailable(format!("{holder}: {status}")))
    } else if status == StatusCode::NOT_FOUND {
        Err(Error::Storage(format!("{holder}: no envelope")))
    } else {
        Err(Error::Storage(format!("{holder}: {status}")))
    }
}

/// a delete that finds nothing has still done its job
fn discard_result(holder: &HolderId, status: StatusCode) -> Result<()> {
    if status == StatusCode::NOT_FOUND {
        return Ok(());
    }
    status_result(holder, status)
}

fn transport_error(holder: &HolderId, e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        Error::Unavailable(format!("{holder}: {e}"))
    } else {
        Error::Storage(format!("{holder}: {e}"))
    }
}

#[async_trait]
impl Custodian for RemoteCustodian {
    fn share_holder(&self) -> ShareHolder {
        self.holder.clone()
    }

    async fn deposit(&self, envelope: &EscrowEnvelope) -> Result<()> {
        if envelope.holder != self.holder.id {
            return Err(Error::UnknownHolder(envelope.holder.to_string()));
        }
        let resp = self
            .http
            .post(self.endpoint(&envelope.dispute_id))
            .json(envelope)
            .send()
            .await
            .map_err(|e| transport_error(&self.holder.id, e))?;
        self.check(resp)?;
        debug!(holder = %self.holder.id, dispute = %envelope.dispute_id, "deposited remotely");
        Ok(())
    }

    async fn release_share(&self, dispute_id: &str) -> Result<KeyShare> {
        let resp = self
            .http
            .get(format!("{}/share", self.endpoint(dispute_id)))
            .send()
            .await
            .map_err(|e| transport_error(&self.holder.id, e))?;
        let body: ReleaseResponse = self
            .check(resp)?
            .json()
            .await
            .map_err(|e| transport_error(&self.holder.id, e))?;

        let raw = Zeroizing::new(
            hex::decode(&body.share).map_err(|_| Error::Malformed("share is not hex"))?,
        );
        KeyShare::from_bytes(&raw)
    }

    async fn discard(&self, dispute_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.endpoint(dispute_id))
            .send()
            .await
            .map_err(|e| transport_error(&self.holder.id, e))?;
        discard_result(&self.holder.id, resp.status())?;
        debug!(holder = %self.holder.id, dispute = %dispute_id, "discarded remotely");
        Ok(())
    }
}
