use super::{AnalysisProvider, Credential, ProviderError, SubmitAck, Upload};
use crate::config::ProviderConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use tracing::debug;

/// reqwest-backed provider client.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base_url}/seg/...` with each segment percent-encoded as a single path element.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Transport(format!("invalid provider base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport("provider base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for HttpProvider {
    async fn send_file(
        &self,
        upload: &Upload,
        credential: &Credential,
    ) -> Result<SubmitAck, ProviderError> {
        let url = self.endpoint(&["sendFile"])?;
        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(upload.mime)
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        debug!(file = %upload.file_name, size = upload.bytes.len(), "uploading document");
        let resp = self
            .client
            .post(url)
            .query(&[("token", credential.expose())])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_json(resp).await?;
        let data = unwrap_envelope(body)?;
        Ok(SubmitAck {
            execution_id: non_empty_str(&data, "executionID"),
            file_ref: non_empty_str(&data, "fileName"),
        })
    }

    async fn query_execution(
        &self,
        execution_id: &str,
        file_ref: &str,
        credential: &Credential,
    ) -> Result<Value, ProviderError> {
        let url = self.endpoint(&["execution", execution_id])?;
        let resp = self
            .client
            .get(url)
            .query(&[("token", credential.expose()), ("fileName", file_ref)])
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_json(resp).await?;
        unwrap_envelope(body)
    }
}

/// The request URL carries the token in its query, so it is stripped first.
fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.without_url().to_string())
    }
}

/// Non-2xx statuses become `Http` with the provider's `message` when it sent one.
async fn read_json(resp: Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    let text = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| non_empty_str(&v, "message"))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// `{success: true, data: X}` -> X; `{success: false, message}` -> Rejected;
/// a bare object passes through unchanged.
fn unwrap_envelope(body: Value) -> Result<Value, ProviderError> {
    if !body.is_object() {
        return Err(ProviderError::Malformed("expected a JSON object".to_string()));
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message =
            non_empty_str(&body, "message").unwrap_or_else(|| "request unsuccessful".to_string());
        return Err(ProviderError::Rejected(message));
    }
    match body {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

fn non_empty_str(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
