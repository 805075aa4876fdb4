use async_trait::async_trait;
use courier_core::{Credentials, Cursor, Envelope, Message, MessageId};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::diagnostics;
use super::{RelayError, RelayTransport};

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(15);
const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct Registered {
    client_id: String,
    api_token: String,
    personal_token: String,
}

#[derive(Deserialize)]
struct PollBatch {
    #[serde(default)]
    messages: Vec<Value>,
}

/// Decodes entries one at a time so a single bad envelope cannot stall the
/// batch. Entries with a readable id but an unreadable envelope become
/// [`Message::unreadable`]; entries without an id are dropped.
fn decode_batch(entries: Vec<Value>) -> Vec<Message> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match Message::deserialize(&entry) {
            Ok(message) => out.push(message),
            Err(err) => match entry.get("id").and_then(|id| MessageId::deserialize(id).ok()) {
                Some(id) => {
                    warn!(message_id = %id, error = %err, "unreadable envelope in poll response");
                    out.push(Message::unreadable(id));
                }
                None => warn!(error = %err, "poll entry without a usable id; dropping it"),
            },
        }
    }
    out
}

/// Relay client over HTTP/JSON.
#[derive(Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(base_url: &str) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RelayError::Transport {
                operation: "init",
                status: None,
                detail: err.to_string(),
                hint: None,
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    fn authed(&self, builder: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        builder
            .bearer_auth(&credentials.api_token)
            .header("X-Client-Id", &credentials.client_id)
    }

    fn unreachable(&self, operation: &'static str, err: reqwest::Error) -> RelayError {
        let hint = (err.is_connect() || err.is_timeout())
            .then(|| diagnostics::connection_hint(&self.base_url));
        RelayError::Transport {
            operation,
            status: None,
            detail: err.to_string(),
            hint,
        }
    }

    async fn check(&self, operation: &'static str, res: Response) -> Result<Response, RelayError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RelayError::AuthExpired { operation });
        }
        let code = status.as_u16();
        let body = res.text().await.unwrap_or_default();
        let detail = diagnostics::body_snippet(&body).unwrap_or_else(|| status.to_string());
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(RelayError::Transport {
                operation,
                status: Some(code),
                detail,
                hint: diagnostics::server_hint(code, &body).map(str::to_string),
            });
        }
        Err(RelayError::Rejected {
            operation,
            status: code,
            detail,
        })
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn register(
        &self,
        fingerprint: &str,
        name: Option<&str>,
    ) -> Result<Credentials, RelayError> {
        let mut body = json!({ "fingerprint": fingerprint });
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            body["name"] = json!(name);
        }
        let res = self
            .client
            .post(self.url("/api/v1/clients/register"))
            .timeout(REGISTER_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|err| RelayError::Registration {
                status: None,
                detail: format!("{err}. {}", diagnostics::connection_hint(&self.base_url)),
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RelayError::Registration {
                status: Some(status.as_u16()),
                detail: diagnostics::body_snippet(&text).unwrap_or_else(|| status.to_string()),
            });
        }
        let issued: Registered = res.json().await.map_err(|err| RelayError::Registration {
            status: Some(status.as_u16()),
            detail: format!("unreadable registration response: {err}"),
        })?;
        debug!(client_id = %issued.client_id, "relay issued credentials");
        Ok(Credentials {
            client_id: issued.client_id,
            api_token: issued.api_token,
            personal_token: issued.personal_token,
            fingerprint: fingerprint.to_string(),
        })
    }

    async fn poll(
        &self,
        credentials: &Credentials,
        cursor: &Cursor,
    ) -> Result<Vec<Message>, RelayError> {
        let mut req = self
            .client
            .get(self.url("/api/v1/messages/poll"))
            .timeout(POLL_TIMEOUT);
        if let Some(id) = cursor.position() {
            req = req.query(&[("cursor", id.as_str())]);
        }
        let res = self
            .authed(req, credentials)
            .send()
            .await
            .map_err(|err| self.unreachable("poll", err))?;
        if res.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let res = self.check("poll", res).await?;
        let batch: PollBatch = res.json().await.map_err(|err| RelayError::Decode {
            operation: "poll",
            detail: err.to_string(),
        })?;
        Ok(decode_batch(batch.messages))
    }

    async fn ack(
        &self,
        credentials: &Credentials,
        last_received_id: &MessageId,
    ) -> Result<(), RelayError> {
        let req = self
            .client
            .post(self.url("/api/v1/messages/ack"))
            .timeout(ACK_TIMEOUT)
            .json(&json!({ "last_received_id": last_received_id }));
        let res = self
            .authed(req, credentials)
            .send()
            .await
            .map_err(|err| self.unreachable("ack", err))?;
        self.check("ack", res).await?;
        Ok(())
    }

    async fn send(&self, credentials: &Credentials, envelope: &Envelope) -> Result<(), RelayError> {
        let req = self
            .client
            .post(self.url("/api/v1/messages/send"))
            .timeout(SEND_TIMEOUT)
            .json(envelope);
        let res = self
            .authed(req, credentials)
            .send()
            .await
            .map_err(|err| self.unreachable("send", err))?;
        self.check("send", res).await?;
        Ok(())
    }
}
