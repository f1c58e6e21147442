//! OpenAI-compatible chat oracle.
//!
//! One `analyze` call is one chat completion: the persona's system prompt
//! plus the section text, with a JSON-object response requested and decoded
//! into findings. Transport and decode failures are both `Error::Oracle`;
//! at aggregation level each costs exactly one sample, nothing more.

use biascope_core::{BiasOracle, Error, Finding, Result};
use serde::{Deserialize, Serialize};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The JSON shape every persona asks the model for. `phrase` must quote the
/// content verbatim; resolution drops anything that does not match exactly.
const RESPONSE_CONTRACT: &str = r#"Respond with a single JSON object, no prose around it:
{"detected_biases": [{"rationale": "...", "category": "...", "phrase": "...", "affected_party": "..."}]}
- "phrase" must quote the content verbatim: the entire phrase, no ellipses, no dropped or added words.
- "category" is the kind of bias detected.
- "affected_party" is the stakeholder whose actions are distorted by the bias.
- Return {"detected_biases": []} when you find none."#;

fn semantic_analyzer_prompt() -> String {
    format!(
        r#"You are a semantic analyzer. You will be given a piece of content and asked to analyze it for bias.
Only analyze the content for semantic biases such as:
- Framing bias: the way information is presented (word choice or tone) influences interpretation. Example: calling a policy "tax relief" versus "government spending".
- Negation bias: negative language used to describe a positive concept. Example: "anti-terrorism" instead of "counter-terrorism".
- Affective bias: emotional language that distorts meaning. Example: "devastating" instead of "significant" in a disaster context.

{RESPONSE_CONTRACT}"#
    )
}

/// A reviewer identity for panel runs: a stable tag plus the system prompt
/// that sets the reviewing lens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerPersona {
    pub tag: String,
    pub system_prompt: String,
}

/// Default three-reviewer panel with deliberately different lenses.
pub fn builtin_reviewers() -> Vec<ReviewerPersona> {
    let lens = |tag: &str, focus: &str| ReviewerPersona {
        tag: tag.to_string(),
        system_prompt: format!(
            r#"You are an expert reviewer evaluating encyclopedic content for bias. {focus}
Maintain scholarly neutrality: base analysis on the text itself, acknowledge multiple perspectives, and avoid emotionally or politically charged terminology of your own.

{RESPONSE_CONTRACT}"#
        ),
    };
    vec![
        lens(
            "methodology",
            "Your lens is methodological: flag claims presented as settled where the underlying evidence is contested, and wording that overstates certainty.",
        ),
        lens(
            "language",
            "Your lens is linguistic: flag loaded word choice, framing, negation patterns, and affectively charged phrasing.",
        ),
        lens(
            "stakeholders",
            "Your lens is stakeholder balance: flag passages that present one party's perspective as neutral fact or that distort a party's actions.",
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct ChatOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    tag: String,
    system_prompt: String,
    timeout_ms: u64,
}

impl ChatOracle {
    /// Oracle with the default semantic-analyzer persona.
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
            tag: "semantic".to_string(),
            system_prompt: semantic_analyzer_prompt(),
            timeout_ms: 60_000,
        }
    }

    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let base_url = env("BIASCOPE_OPENAI_COMPAT_BASE_URL").ok_or_else(|| {
            Error::NotConfigured("missing BIASCOPE_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let api_key = env("BIASCOPE_OPENAI_COMPAT_API_KEY");

        let model = model_override
            .or_else(|| env("BIASCOPE_OPENAI_COMPAT_MODEL"))
            .ok_or_else(|| {
                Error::NotConfigured(
                    "missing model (set --model or BIASCOPE_OPENAI_COMPAT_MODEL)".to_string(),
                )
            })?;

        Ok(Self::new(client, base_url, api_key, model))
    }

    pub fn with_persona(mut self, persona: &ReviewerPersona) -> Self {
        self.tag = persona.tag.clone();
        self.system_prompt = persona.system_prompt.clone();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            response_format: Some(ResponseFormat {
                kind: "json_object".to_string(),
            }),
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Oracle(format!("chat.completions HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Oracle(e.to_string()))?;
        Ok(parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl BiasOracle for ChatOracle {
    fn name(&self) -> &str {
        &self.tag
    }

    async fn analyze(&self, section_text: &str) -> Result<Vec<Finding>> {
        let raw = self.chat(&self.system_prompt, section_text).await?;
        let body = strip_code_fence(&raw);
        let parsed: OracleAnalysis = serde_json::from_str(body)
            .map_err(|e| Error::Oracle(format!("undecodable oracle response: {e}")))?;
        tracing::debug!(
            oracle = %self.tag,
            findings = parsed.detected_biases.len(),
            "oracle sample decoded"
        );
        Ok(parsed.detected_biases)
    }
}

/// Tolerate models that wrap the JSON object in a Markdown code fence.
fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().trim_end_matches("```").trim()
}

#[derive(Debug, Clone, Deserialize)]
struct OracleAnalysis {
    #[serde(default)]
    detected_biases: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::net::SocketAddr;

    fn completion_with(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    async fn serve_completion(content: &'static str) -> SocketAddr {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { Json(completion_with(content)) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn oracle_at(addr: SocketAddr) -> ChatOracle {
        ChatOracle::new(
            reqwest::Client::new(),
            format!("http://{addr}"),
            None,
            "test-model".to_string(),
        )
    }

    #[tokio::test]
    async fn analyze_decodes_findings_from_json_object() {
        let addr = serve_completion(
            r#"{"detected_biases": [{"rationale": "emotional wording", "category": "affective", "phrase": "devastating", "affected_party": "residents"}]}"#,
        )
        .await;

        let findings = oracle_at(addr).analyze("a devastating storm").await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].phrase, "devastating");
        assert_eq!(findings[0].category, "affective");
    }

    #[tokio::test]
    async fn analyze_tolerates_code_fenced_json() {
        let addr = serve_completion(
            "```json\n{\"detected_biases\": [{\"rationale\": \"r\", \"category\": \"framing\", \"phrase\": \"p\", \"affected_party\": \"a\"}]}\n```",
        )
        .await;

        let findings = oracle_at(addr).analyze("text").await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, "framing");
    }

    #[tokio::test]
    async fn analyze_reports_undecodable_responses_as_oracle_errors() {
        let addr = serve_completion("I could not find any bias in this text.").await;

        let err = oracle_at(addr).analyze("text").await.unwrap_err();
        assert!(matches!(err, Error::Oracle(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn analyze_treats_empty_bias_list_as_success() {
        let addr = serve_completion(r#"{"detected_biases": []}"#).await;
        let findings = oracle_at(addr).analyze("text").await.unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn persona_changes_name_and_prompt() {
        let oracle = ChatOracle::new(
            reqwest::Client::new(),
            "http://localhost".to_string(),
            None,
            "m".to_string(),
        );
        assert_eq!(oracle.name(), "semantic");

        let reviewers = builtin_reviewers();
        assert_eq!(reviewers.len(), 3);
        let oracle = oracle.with_persona(&reviewers[1]);
        assert_eq!(oracle.name(), "language");
        assert!(oracle.system_prompt.contains("detected_biases"));
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }
}
