//! Connector invocation (sec 6 "Connector invocation"). Connector
//! failures are isolated: the LLM tool call receives an empty result,
//! the chat request itself never fails because of a connector error
//! (sec 7 "Propagation policy").

use serde_json::Value;

use crate::models::Connector;

#[derive(Clone)]
pub struct ConnectorClient {
    http: reqwest::Client,
}

impl ConnectorClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Invokes `connector` with `args`, forwarding `auth_header` verbatim
    /// as `X-Connector-Auth` when present. Any failure, non-2xx status,
    /// or response shape other than `{"data": <anything>}` resolves to
    /// `Value::Null` rather than propagating an error.
    pub async fn invoke(&self, connector: &Connector, args: Value, auth_header: Option<&str>) -> Value {
        match self.try_invoke(connector, args, auth_header).await {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(connector = %connector.name, error = %err, "connector invocation failed");
                Value::Null
            }
        }
    }

    async fn try_invoke(&self, connector: &Connector, args: Value, auth_header: Option<&str>) -> anyhow::Result<Value> {
        let mut request = self
            .http
            .request(connector.method.as_http_method(), &connector.endpoint)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "data": args }));

        if let Some(auth) = auth_header {
            request = request.header("X-Connector-Auth", auth);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("connector returned {}", response.status());
        }

        let body: Value = response.json().await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

impl Default for ConnectorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_constructs_with_default() {
        let _client = ConnectorClient::default();
    }
}
