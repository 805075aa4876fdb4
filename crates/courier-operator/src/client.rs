use anyhow::{anyhow, Result};
use courier_client::relay::diagnostics;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct ClientList {
    #[serde(default)]
    clients: Vec<ClientSummary>,
}

#[derive(Deserialize)]
struct MessageFeed {
    #[serde(default)]
    messages: Vec<Value>,
}

/// Operator-side relay API: list clients, read a client's feed, publish to it.
pub struct OperatorClient {
    client: reqwest::Client,
    base_url: String,
    operator_token: String,
    admin_token: String,
}

impl OperatorClient {
    pub fn new(base_url: &str, operator_token: String, admin_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("courier-operator/", env!("CARGO_PKG_VERSION")))
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            operator_token,
            admin_token,
        })
    }

    pub async fn clients(&self) -> Result<Vec<ClientSummary>> {
        let res = self
            .client
            .get(format!("{}/api/v1/operators/clients", self.base_url))
            .header("X-Operator-Token", &self.operator_token)
            .send()
            .await
            .map_err(|err| self.unreachable(err))?;
        let list: ClientList = check("list clients", res).await?.json().await?;
        Ok(list.clients)
    }

    pub async fn messages(&self, client_id: &str, cursor: Option<&str>) -> Result<Vec<Value>> {
        let mut req = self
            .client
            .get(format!(
                "{}/api/v1/operators/clients/{}/messages",
                self.base_url, client_id
            ))
            .header("X-Operator-Token", &self.operator_token);
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }
        let res = req.send().await.map_err(|err| self.unreachable(err))?;
        if res.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let feed: MessageFeed = check("fetch messages", res).await?.json().await?;
        Ok(feed.messages)
    }

    pub async fn publish(&self, client_id: &str, kind: &str, payload: &Value) -> Result<Value> {
        let res = self
            .client
            .post(format!("{}/api/v1/messages/publish", self.base_url))
            .header("X-Admin-Token", &self.admin_token)
            .json(&json!({
                "to_client_ids": [client_id],
                "type": kind,
                "payload": payload,
            }))
            .send()
            .await
            .map_err(|err| self.unreachable(err))?;
        let body: Value = check("publish", res).await?.json().await?;
        debug!(client_id, response = %body, "published");
        Ok(body)
    }

    fn unreachable(&self, err: reqwest::Error) -> anyhow::Error {
        anyhow!("{err}. {}", diagnostics::connection_hint(&self.base_url))
    }
}

async fn check(operation: &str, res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let mut message = format!("{operation} failed with status {status}");
    if let Some(snippet) = diagnostics::body_snippet(&body) {
        message.push_str(&format!(": {snippet}"));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        message.push_str(". Check the operator and admin tokens.");
    } else if let Some(hint) = diagnostics::server_hint(status.as_u16(), &body) {
        message.push_str(&format!(". {hint}"));
    }
    Err(anyhow!(message))
}
