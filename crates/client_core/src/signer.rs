use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::{Address, TransactionDigest},
    protocol::{IdentityResponse, MoveCallRequest, SignAndExecuteRequest, SignAndExecuteResponse},
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::Signer;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid signer url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("signer transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("signer rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("request sender {requested} does not match connected identity {connected}")]
    SenderMismatch {
        requested: Address,
        connected: Address,
    },
}

/// Wallet bridge reached over HTTP. The bridge holds the keys, asks the user
/// to approve, signs, and executes; this side only sees the digest.
pub struct RemoteSigner {
    http: Client,
    base_url: Url,
    identity: Option<Address>,
}

impl RemoteSigner {
    /// Uses `identity` when given, otherwise asks the bridge which account is
    /// connected. An unreachable bridge leaves the signer without identity.
    pub async fn connect(
        base_url: &str,
        identity: Option<Address>,
        timeout: Duration,
    ) -> Result<Self, SignerError> {
        let http = Client::builder().timeout(timeout).build()?;
        let mut base_url = Url::parse(base_url)?;
        // keep a path prefix intact when joining endpoint paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let identity = match identity {
            Some(identity) => Some(identity),
            None => match fetch_identity(&http, &base_url).await {
                Ok(identity) => identity,
                Err(err) => {
                    warn!(%base_url, "signer: could not query connected identity: {err}");
                    None
                }
            },
        };
        if let Some(identity) = &identity {
            info!(%identity, "signer: identity connected");
        }

        Ok(Self {
            http,
            base_url,
            identity,
        })
    }
}

async fn fetch_identity(http: &Client, base_url: &Url) -> Result<Option<Address>, SignerError> {
    let response: IdentityResponse = http
        .get(base_url.join("v1/identity")?)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(response.address)
}

#[async_trait]
impl Signer for RemoteSigner {
    fn identity(&self) -> Option<Address> {
        self.identity.clone()
    }

    async fn sign_and_execute(
        &self,
        request: &MoveCallRequest,
    ) -> anyhow::Result<TransactionDigest> {
        if let Some(connected) = &self.identity {
            if connected != &request.sender {
                return Err(SignerError::SenderMismatch {
                    requested: request.sender.clone(),
                    connected: connected.clone(),
                }
                .into());
            }
        }

        let response = self
            .http
            .post(self.base_url.join("v1/sign-and-execute")?)
            .json(&SignAndExecuteRequest {
                sender: request.sender.clone(),
                transaction: request.clone(),
            })
            .send()
            .await
            .map_err(SignerError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected { status, message }.into());
        }

        let body: SignAndExecuteResponse = response.json().await.map_err(SignerError::from)?;
        Ok(body.digest)
    }
}

#[cfg(test)]
#[path = "tests/signer_tests.rs"]
mod tests;
