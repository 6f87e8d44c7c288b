use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, redirect::Policy};
use serde_json::{Value, json};
use url::Url;

use super::ClientError;

/// Carries one JSON request body to the service and returns the decoded JSON
/// response body, whatever its HTTP status.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Value) -> Result<Value, ClientError>;
}

/// HTTP transport posting to `<base>/api`, keeping the session cookie.
pub struct HttpTransport {
    client: Client,
    base: Url,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(base: Url) -> Result<Self, ClientError> {
        let endpoint = base
            .join("api")
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            base,
            endpoint,
        })
    }

    /// Authenticate every call with an application key instead of a session.
    pub fn with_application_key(base: Url, app: &str, key: &str) -> Result<Self, ClientError> {
        let mut transport = Self::new(base)?;
        transport
            .endpoint
            .query_pairs_mut()
            .append_pair("app", app)
            .append_pair("key", key);
        Ok(transport)
    }

    /// Sign in through the login form. A redirect means the session is set.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let url = self
            .base
            .join("login")
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password), ("next", "/")])
            .send()
            .await?;

        if response.status().is_redirection() {
            tracing::info!(username, "signed in");
            Ok(())
        } else {
            Err(ClientError::Remote {
                code: None,
                message: "Invalid username or password.".to_string(),
            })
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Value) -> Result<Value, ClientError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        tracing::debug!(status = %response.status(), "rpc response");
        Ok(response.json::<Value>().await?)
    }
}

/// A response body that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Result(Value),
    Error { code: Option<i64>, message: String },
}

impl Envelope {
    pub fn decode(body: Value) -> Result<Self, ClientError> {
        let Value::Object(mut body) = body else {
            return Err(ClientError::InvalidResponse);
        };

        match body.remove("error") {
            Some(Value::Object(error)) => {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|message| !message.is_empty())
                    .ok_or(ClientError::InvalidResponse)?;
                return Ok(Envelope::Error {
                    code: error.get("code").and_then(Value::as_i64),
                    message: message.to_string(),
                });
            }
            None | Some(Value::Null) => {}
            Some(_) => return Err(ClientError::InvalidResponse),
        }

        match body.remove("result") {
            None | Some(Value::Null) => Err(ClientError::InvalidResponse),
            Some(result) => Ok(Envelope::Result(result)),
        }
    }

    pub fn into_result(self) -> Result<Value, ClientError> {
        match self {
            Envelope::Result(result) => Ok(result),
            Envelope::Error { code, message } => Err(ClientError::Remote { code, message }),
        }
    }
}

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let body = self
            .transport
            .send(json!({ "method": method, "params": params }))
            .await?;
        let outcome = Envelope::decode(body).and_then(Envelope::into_result);
        if let Err(e) = &outcome {
            tracing::warn!(method, error = %e, "rpc call failed");
        }
        outcome
    }
}
