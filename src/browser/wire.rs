// SPDX-License-Identifier: MIT
// Minimal W3C WebDriver wire client.
//
// Speaks just enough of the protocol for this tool: session create/delete,
// navigation, element and descendant lookup, text and attribute reads, the
// implicit-wait timeout, and window maximize. Anything fancier belongs in a
// full client crate, not here.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::browser::client::{ClientError, Element, WebClient};

// ─── Wire envelopes ───────────────────────────────────────────────────────────

/// Every WebDriver response wraps its payload in a `value` field.
#[derive(Debug, Deserialize)]
struct Reply<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    error: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// An element reference keyed by the W3C element-identifier constant.
#[derive(Debug, Deserialize)]
struct ElementRef {
    #[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
    id: String,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// HTTP client bound to one remote WebDriver session.
pub struct WireClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WireClient {
    /// Create a remote session against a running driver endpoint.
    ///
    /// `capabilities` is the W3C capabilities object (the value placed under
    /// the request's `"capabilities"` key).
    pub async fn new_session(
        base_url: &str,
        capabilities: serde_json::Value,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let resp = http
            .post(format!("{base_url}/session"))
            .json(&json!({ "capabilities": capabilities }))
            .send()
            .await?;
        let value: NewSessionValue = unwrap_reply(resp).await?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            session_id: value.session_id,
        })
    }

    #[cfg(test)]
    pub(crate) fn detached(base_url: &str, session_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            session_id: session_id.to_string(),
        }
    }

    /// Apply an implicit wait (milliseconds) to element lookups.
    pub async fn set_implicit_wait(&self, ms: u64) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post("timeouts", json!({ "implicit": ms })).await?;
        Ok(())
    }

    /// Maximize the browser window.
    pub async fn maximize_window(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post("window/maximize", json!({})).await?;
        Ok(())
    }

    /// Delete the remote session. The browser closes; the driver process is
    /// the caller's to reap.
    pub async fn delete_session(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(format!("{}/session/{}", self.base_url, self.session_id))
            .send()
            .await?;
        let _: serde_json::Value = unwrap_reply(resp).await?;
        Ok(())
    }

    // ─── Private ─────────────────────────────────────────────────────────────

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(format!(
                "{}/session/{}/{path}",
                self.base_url, self.session_id
            ))
            .json(&body)
            .send()
            .await?;
        unwrap_reply(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!(
                "{}/session/{}/{path}",
                self.base_url, self.session_id
            ))
            .send()
            .await?;
        unwrap_reply(resp).await
    }
}

/// Unwrap the `{"value": ...}` envelope, mapping non-2xx responses to the
/// driver's own error code and message.
async fn unwrap_reply<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        let reply: Reply<T> = resp.json().await?;
        return Ok(reply.value);
    }
    match resp.json::<Reply<ErrorValue>>().await {
        Ok(reply) => Err(ClientError::WebDriver {
            error: reply.value.error,
            message: reply.value.message,
        }),
        Err(_) => Err(ClientError::WebDriver {
            error: format!("http {status}"),
            message: String::new(),
        }),
    }
}

#[async_trait]
impl WebClient for WireClient {
    async fn navigate(&self, url: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post("url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn find_first(&self, selector: &str) -> Result<Option<Element>, ClientError> {
        let body = json!({ "using": "css selector", "value": selector });
        match self.post::<ElementRef>("element", body).await {
            Ok(el) => Ok(Some(Element(el.id))),
            Err(ClientError::WebDriver { ref error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, ClientError> {
        let body = json!({ "using": "css selector", "value": selector });
        let refs: Vec<ElementRef> = self.post("elements", body).await?;
        Ok(refs.into_iter().map(|r| Element(r.id)).collect())
    }

    async fn find_children(
        &self,
        element: &Element,
        tag: &str,
    ) -> Result<Vec<Element>, ClientError> {
        let body = json!({ "using": "tag name", "value": tag });
        let refs: Vec<ElementRef> = self
            .post(&format!("element/{}/elements", element.0), body)
            .await?;
        Ok(refs.into_iter().map(|r| Element(r.id)).collect())
    }

    async fn text(&self, element: &Element) -> Result<String, ClientError> {
        self.get(&format!("element/{}/text", element.0)).await
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, ClientError> {
        self.get(&format!("element/{}/attribute/{name}", element.0))
            .await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ref_parses_w3c_identifier() {
        let raw = r#"{"element-6066-11e4-a52e-4f735466cecf": "abc-123"}"#;
        let el: ElementRef = serde_json::from_str(raw).unwrap();
        assert_eq!(el.id, "abc-123");
    }

    #[test]
    fn test_reply_envelope_unwraps_value() {
        let raw = r#"{"value": {"sessionId": "s-1", "capabilities": {}}}"#;
        let reply: Reply<NewSessionValue> = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.value.session_id, "s-1");
    }

    #[test]
    fn test_error_value_parses_driver_error() {
        let raw = r#"{"value": {"error": "no such element", "message": "Unable to locate element", "stacktrace": ""}}"#;
        let reply: Reply<ErrorValue> = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.value.error, "no such element");
        assert_eq!(reply.value.message, "Unable to locate element");
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_transport_error() {
        // Nothing listens on the discard port, so the round trip must fail
        // before any protocol handling.
        let client = WireClient::detached("http://127.0.0.1:9", "dead");
        let err = client.navigate("https://example.org").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
