//! Client-side transport to the gateway.

use serde_json::Value;
use url::Url;

use crate::gateway::Action;

/// Errors surfaced by a gateway call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The gateway answered with an `{"error"}` body; the message is what
    /// the backend or gateway reported.
    #[error("{message}")]
    Gateway { message: String, status: u16 },
    /// The gateway could not be reached.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The gateway answered 2xx without a readable `data` field.
    #[error("malformed gateway response")]
    Malformed,
}

/// Thin wrapper over the gateway's single-endpoint contract: POST
/// `{action, payload}`, optional bearer credential, `{data}` out.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl GatewayClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Invoke a gateway action and return its `data` payload.
    pub async fn call(
        &self,
        action: Action,
        payload: Value,
        bearer: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut request = self.http.post(self.endpoint.clone()).json(&serde_json::json!({
            "action": action.as_str(),
            "payload": payload,
        }));
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let mut body: Value = response.json().await.map_err(|_| ClientError::Malformed)?;

        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(ClientError::Gateway {
                message: message.to_string(),
                status,
            });
        }
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(ClientError::Malformed),
        }
    }
}
