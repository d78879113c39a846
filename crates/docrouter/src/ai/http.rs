//! HTTP client for the document-AI service.

use std::time::Duration;

use base64::Engine;
use log::debug;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{
    decode_string_payload, unwrap_response, AiError, CompletionCapability, CompletionRequest,
    DocumentInput, ExtractionCapability, FieldSpec,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`HttpAiProvider`].
#[derive(Debug)]
pub struct HttpAiConfig {
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub validation_model: String,
}

/// Implements both capabilities against `POST /v1/extract` and `POST /v1/complete`.
pub struct HttpAiProvider {
    endpoint: String,
    client: Client,
    api_key: Option<SecretString>,
    timeout_secs: u64,
    validation_model: String,
}

#[derive(Serialize)]
struct ExtractBody<'a> {
    file_name: &'a str,
    mime_type: &'a str,
    content: String,
    response_format: Vec<[&'a str; 2]>,
}

#[derive(Serialize)]
struct CompleteBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    response_format: Value,
}

impl HttpAiProvider {
    pub fn new(config: HttpAiConfig) -> Result<Self, AiError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&endpoint).map_err(|e| AiError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AiError::InvalidEndpoint {
                endpoint: config.endpoint,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            endpoint,
            client,
            api_key: config.api_key,
            timeout_secs: config.timeout_secs,
            validation_model: config.validation_model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, AiError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AiError::Connection(crate::sanitize::redact_url(&self.endpoint))
            } else {
                AiError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| AiError::MalformedResponse(e.to_string()))
    }
}

impl ExtractionCapability for HttpAiProvider {
    fn extract(
        &self,
        document: &DocumentInput<'_>,
        fields: &[FieldSpec],
    ) -> Result<Map<String, Value>, AiError> {
        debug!(
            "Extracting {} field(s) from {}",
            fields.len(),
            document.file_name
        );
        let body = ExtractBody {
            file_name: document.file_name,
            mime_type: document.mime_type,
            content: base64::engine::general_purpose::STANDARD.encode(document.content),
            response_format: fields
                .iter()
                .map(|f| [f.name.as_str(), f.instruction.as_str()])
                .collect(),
        };

        let reply = decode_string_payload(unwrap_response(self.post_json("/v1/extract", &body)?));
        match reply {
            Value::Object(map) => Ok(map),
            other => Err(AiError::MalformedResponse(format!(
                "expected an object of extracted fields, got {}",
                other
            ))),
        }
    }
}

impl CompletionCapability for HttpAiProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Value, AiError> {
        let body = CompleteBody {
            model: &self.validation_model,
            prompt: &request.prompt,
            temperature: request.temperature,
            response_format: json!({
                "type": "json",
                "schema": request.output_schema,
            }),
        };

        let reply = self.post_json("/v1/complete", &body)?;
        Ok(decode_string_payload(unwrap_response(reply)))
    }
}
