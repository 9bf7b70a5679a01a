use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tracing::{debug, error};
use workflow_capture::decision::{DecisionOracle, OracleRequest};
use workflow_capture::{ConfigError, OracleError};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Vision model behind the messages API. One request per step, no
/// conversation memory: the prompt carries the recent history itself.
pub struct Brain {
    client: Client,
    api_key: String,
    model: String,
    runtime: Handle,
}

impl Brain {
    /// Reads `ORACLE_API_KEY` (or `ANTHROPIC_API_KEY`) and `ORACLE_MODEL`.
    pub fn from_env(runtime: Handle) -> Result<Self> {
        let api_key = std::env::var("ORACLE_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .map_err(|_| ConfigError::Missing {
                key: "ORACLE_API_KEY",
            })?;
        let model = std::env::var("ORACLE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model,
            runtime,
        })
    }

    fn body(&self, request: &OracleRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": STANDARD.encode(request.screenshot),
                        }
                    },
                    {"type": "text", "text": request.prompt},
                ]
            }]
        })
    }

    async fn ask(&self, body: Value) -> Result<String, OracleError> {
        let response = self
            .client
            .post(ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let json_resp: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            error!(%status, %message, "oracle API error");
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        extract_text(&json_resp).ok_or(OracleError::EmptyResponse)
    }
}

/// First text block of a messages API response.
fn extract_text(response: &Value) -> Option<String> {
    response["content"]
        .as_array()?
        .iter()
        .find(|block| block["type"] == "text")
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
        .filter(|text| !text.trim().is_empty())
}

impl DecisionOracle for Brain {
    fn complete(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        debug!(model = %self.model, bytes = request.screenshot.len(), "asking oracle");
        let body = self.body(request);
        // called from a blocking worker thread, never from inside the runtime
        self.runtime.block_on(self.ask(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_is_extracted() {
        let response = json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "{\"action\": \"done\"}"}
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("{\"action\": \"done\"}"));
        assert_eq!(extract_text(&json!({"content": []})), None);
        assert_eq!(extract_text(&json!({"content": [{"type": "text", "text": "  "}]})), None);
    }

    #[tokio::test]
    async fn request_body_carries_image_and_prompt() {
        let brain = Brain {
            client: Client::new(),
            api_key: "k".into(),
            model: "m".into(),
            runtime: Handle::current(),
        };
        let body = brain.body(&OracleRequest {
            screenshot: b"png",
            prompt: "TASK: x".into(),
        });
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["source"]["data"], "cG5n");
        assert_eq!(content[1]["text"], "TASK: x");
        assert_eq!(body["max_tokens"], 1024);
    }
}
