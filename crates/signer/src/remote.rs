use async_trait::async_trait;
use jsonrpsee::{
    core::RpcResult,
    proc_macros::rpc,
    ws_client::{WsClient, WsClientBuilder},
};
use tracing::trace;

use crate::{
    error::{SignerError, SignerResult},
    types::{SignatureRequest, SignatureResponse, ThresholdSigner},
};

/// The wire surface of the external signing service. Requests carry their
/// `id`; the websocket transport multiplexes concurrent calls and routes each
/// response back to its originator.
#[rpc(client, namespace = "signer")]
pub trait SignerApi {
    #[method(name = "sign")]
    async fn sign(&self, request: SignatureRequest) -> RpcResult<SignatureResponse>;
}

/// Client for the remote threshold-Schnorr service.
pub struct RemoteSigner {
    client: WsClient,
}

impl RemoteSigner {
    pub async fn connect(url: &str) -> SignerResult<Self> {
        let client = WsClientBuilder::default()
            .build(url)
            .await
            .map_err(|e| SignerError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ThresholdSigner for RemoteSigner {
    async fn sign_async(&self, request: SignatureRequest) -> SignerResult<SignatureResponse> {
        trace!(id = %request.id, "requesting threshold signature");

        let response = self
            .client
            .sign(request)
            .await
            .map_err(|e| match e {
                jsonrpsee::core::ClientError::RequestTimeout => SignerError::Timeout,
                other => SignerError::Transport(other.to_string()),
            })?;

        if response.id != request.id || response.signing_hash != request.signing_hash {
            return Err(SignerError::Rejected(
                "response does not match request".to_string(),
            ));
        }

        Ok(response)
    }
}
