//! LLM-backed classification oracle.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (vLLM,
//! llama.cpp server, OpenAI itself). One request per oracle call; retrying an
//! empty answer is the cascade's job, not this client's.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tariff_cascade::{ClassificationOracle, Node, Nomenclature, OracleError, Tier};
use tracing::debug;

use crate::config::OracleEndpoint;
use crate::prompts;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String, OracleError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("response has no choices".into()))
    }
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct LlmOracle {
    endpoint: OracleEndpoint,
    client: reqwest::Client,
    /// Renders candidate descriptions into the prompt; codes only without it.
    nomenclature: Option<Arc<dyn Nomenclature>>,
}

impl LlmOracle {
    pub fn new(endpoint: OracleEndpoint) -> Result<Self, OracleError> {
        if endpoint.model.trim().is_empty() {
            return Err(OracleError::Configuration("model name is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| OracleError::Configuration(e.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            nomenclature: None,
        })
    }

    pub fn with_nomenclature(mut self, nomenclature: Arc<dyn Nomenclature>) -> Self {
        self.nomenclature = Some(nomenclature);
        self
    }

    pub fn endpoint(&self) -> &OracleEndpoint {
        &self.endpoint
    }

    /// `(code, description)` pairs for the prompt.
    async fn render_candidates(
        &self,
        tier: Tier,
        candidates: &[Node],
    ) -> Result<Vec<(String, String)>, OracleError> {
        let mut rendered = Vec::with_capacity(candidates.len());
        for node in candidates {
            let description = match (&node.description, &self.nomenclature) {
                (Some(d), _) => d.clone(),
                (None, Some(store)) => store
                    .describe(tier, node.code.trim())
                    .await
                    .map_err(OracleError::CandidateLookup)?,
                (None, None) => String::new(),
            };
            rendered.push((node.code.clone(), description));
        }
        Ok(rendered)
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.endpoint.timeout())
        } else {
            OracleError::Transport(e.to_string())
        }
    }

    /// Round-trip a `GET {base_url}/models` to check the endpoint is up.
    pub async fn probe(&self) -> Result<Vec<String>, OracleError> {
        let response = self
            .client
            .get(self.endpoint.url("models"))
            .headers(self.auth_headers())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        Ok(json["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &self.endpoint.api_key {
            if let Ok(value) = format!("Bearer {key}").parse() {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }
        headers
    }
}

#[async_trait]
impl ClassificationOracle for LlmOracle {
    async fn classify(
        &self,
        tier: Tier,
        term: &str,
        candidates: &[Node],
    ) -> Result<Vec<Node>, OracleError> {
        if candidates.is_empty() {
            debug!(%tier, "empty grounding set, skipping request");
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let rendered = self.render_candidates(tier, candidates).await?;

        let request_body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": [
                {"role": "system", "content": prompts::system_prompt(tier)},
                {"role": "user", "content": prompts::user_prompt(tier, term, &rendered)}
            ],
            "temperature": self.endpoint.temperature,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(self.endpoint.url("chat/completions"))
            .headers(self.auth_headers())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(self.endpoint.timeout())
            } else {
                OracleError::MalformedResponse(e.to_string())
            }
        })?;

        if let Some(usage) = &chat.usage {
            debug!(
                %tier,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "oracle token usage"
            );
        }

        let codes = prompts::parse_codes(&chat.into_content()?)?;
        debug!(
            %tier,
            candidates = candidates.len(),
            selected = codes.len(),
            elapsed_ms = elapsed_ms(start),
            "oracle answered"
        );
        Ok(codes.into_iter().map(Node::new).collect())
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Parse a raw chat completions body; exposed for tests and offline replay.
pub fn codes_from_body(body: &str) -> Result<Vec<String>, OracleError> {
    let chat: ChatResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
    prompts::parse_codes(&chat.into_content()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tariff_cascade::{Entry, InMemoryNomenclature};

    fn endpoint() -> OracleEndpoint {
        OracleEndpoint {
            base_url: "http://127.0.0.1:9/v1".into(),
            timeout_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn empty_model_is_configuration_error() {
        let result = LlmOracle::new(OracleEndpoint {
            model: " ".into(),
            ..endpoint()
        });
        assert!(matches!(result, Err(OracleError::Configuration(_))));
    }

    #[test]
    fn body_parsing() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"codes\": [\"02\", \"02\"]}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
        }"#;
        assert_eq!(codes_from_body(body).unwrap(), vec!["02"]);
    }

    #[test]
    fn body_without_choices_is_malformed() {
        let err = codes_from_body(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn candidates_rendered_through_nomenclature() {
        let store = InMemoryNomenclature::new()
            .with(Tier::Group, Entry::new("01", "Live animals"));
        let oracle = LlmOracle::new(endpoint())
            .unwrap()
            .with_nomenclature(Arc::new(store));

        let rendered = oracle
            .render_candidates(Tier::Group, &[Node::new("01"), Node::new("99")])
            .await
            .unwrap();
        assert_eq!(
            rendered,
            vec![
                ("01".to_string(), "Live animals".to_string()),
                ("99".to_string(), String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_grounding_set_skips_request() {
        let oracle = LlmOracle::new(endpoint()).unwrap();
        let nodes = oracle.classify(Tier::Top, "beef", &[]).await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_hard_failure() {
        let oracle = LlmOracle::new(endpoint()).unwrap();
        let err = oracle
            .classify(Tier::Top, "beef", &[Node::new("I")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::Transport(_) | OracleError::Timeout(_)
        ));
    }
}
