use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use docqa_core::config::GenerationSettings;
use docqa_core::traits::Generator;
use docqa_core::types::{Answer, AnswerType, RankedCandidate, SelectionMode};

pub const UNPARSEABLE_REPLY: &str = "Unable to parse model response.";
const OUT_OF_SCOPE_MARKER: &str = "OUT_OF_SCOPE";

const SYSTEM_PROMPT: &str = "You are a domain-constrained QA assistant. Use ONLY the supplied context to answer. \
If the answer is not in the context, reply with OUT_OF_SCOPE.
Classify the answer type as one of: factual, contextual, analytical, descriptive, summarization, out_of_scope.
Return JSON with keys: answer, answer_type, sources (list).";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ReplyBody {
    answer: String,
    #[serde(default)]
    answer_type: Option<String>,
    #[serde(default)]
    sources: Option<Vec<Value>>,
}

/// Answer fields recovered from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub answer: String,
    pub answer_type: AnswerType,
    /// `None` when the reply named no sources.
    pub sources: Option<Vec<String>>,
}

/// Unknown labels read as `contextual`.
pub fn parse_answer_type(label: &str) -> AnswerType {
    serde_json::from_value(Value::String(label.trim().to_lowercase())).unwrap_or(AnswerType::Contextual)
}

fn source_label(value: Value) -> String {
    match value {
        Value::Number(n) => format!("page:{n}"),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Reads the outermost `{...}` of a reply as the JSON answer. A reply without
/// braces is taken verbatim as a factual answer.
pub fn parse_reply(text: &str) -> ParsedReply {
    let trimmed = text.trim();
    let unparseable = || ParsedReply { answer: UNPARSEABLE_REPLY.to_string(), answer_type: AnswerType::OutOfScope, sources: None };
    let Some(start) = trimmed.find('{') else {
        let answer_type = if trimmed.contains(OUT_OF_SCOPE_MARKER) { AnswerType::OutOfScope } else { AnswerType::Factual };
        return ParsedReply { answer: trimmed.to_string(), answer_type, sources: None };
    };
    let Some(end) = trimmed.rfind('}').filter(|&end| end > start) else { return unparseable() };
    match serde_json::from_str::<ReplyBody>(&trimmed[start..=end]) {
        Ok(body) => ParsedReply {
            answer: body.answer.trim().to_string(),
            answer_type: body.answer_type.as_deref().map_or(AnswerType::Contextual, parse_answer_type),
            sources: body.sources.map(|s| s.into_iter().map(source_label).collect()),
        },
        Err(e) => {
            warn!(error = %e, "model reply is not valid answer JSON");
            unparseable()
        }
    }
}

/// Answers through an OpenAI-compatible `/chat/completions` endpoint, trying
/// each configured model in turn.
pub struct ChatGenerator {
    client: reqwest::Client,
    url: String,
    models: Vec<String>,
    api_key: Option<String>,
    context_chars: usize,
}

impl ChatGenerator {
    pub const NAME: &'static str = "remote-llm";

    pub fn new(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("building HTTP client")?;
        let mut models = vec![settings.model.clone()];
        for model in &settings.fallback_models {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        let api_key = settings.api_key.clone().or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Ok(Self {
            client,
            url: format!("{}/chat/completions", settings.endpoint.trim_end_matches('/')),
            models,
            api_key: api_key.filter(|k| !k.is_empty()),
            context_chars: settings.context_chars,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn prompt(&self, question: &str, context: &[RankedCandidate]) -> String {
        let context_text = context
            .iter()
            .map(|c| format!("[p{}] {}", c.page, c.text.chars().take(self.context_chars).collect::<String>()))
            .collect::<Vec<_>>()
            .join("\n---\n");
        format!("Question: {question}\nContext:\n{context_text}\n")
    }

    /// `Ok(None)` when the endpoint does not know `model`.
    async fn complete(&self, model: &str, prompt: &str) -> anyhow::Result<Option<String>> {
        let body = ChatRequest {
            model,
            messages: [ChatMessage { role: "system", content: SYSTEM_PROMPT }, ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.with_context(|| format!("POST {}", self.url))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("{} returned {} for model {model}", self.url, status);
        }
        let parsed: ChatResponse = response.json().await.context("decoding chat response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(Some)
            .ok_or_else(|| anyhow!("empty chat response from model {model}"))
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn generate(&self, question: &str, context: &[RankedCandidate]) -> anyhow::Result<Answer> {
        let prompt = self.prompt(question, context);
        let mut last_error = None;
        for model in &self.models {
            match self.complete(model, &prompt).await {
                Ok(Some(text)) => {
                    let reply = parse_reply(&text);
                    debug!(model = %model, answer_type = ?reply.answer_type, "model answered");
                    return Ok(Answer {
                        answer: reply.answer,
                        answer_type: reply.answer_type,
                        sources: reply.sources.unwrap_or_else(|| context.iter().map(|c| format!("page:{}", c.page)).collect()),
                        source_snippets: Vec::new(),
                        document_ids_used: Vec::new(),
                        retrieved: context.len(),
                        latency_ms: 0,
                        generation_mode: Self::NAME.to_string(),
                        embed_mode: None,
                        selection: SelectionMode::Threshold,
                        fallback_reason: None,
                    });
                }
                Ok(None) => {
                    warn!(model = %model, "model not found; trying next");
                    last_error = Some(anyhow!("model {model} not found at {}", self.url));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "generation attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("no generation model configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::config::GenerationProvider;
    use docqa_core::types::SourceKind;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            provider: GenerationProvider::Remote,
            endpoint: "http://localhost:8080/v1/".to_string(),
            model: "small".to_string(),
            fallback_models: vec!["small".to_string(), "large".to_string()],
            api_key: Some(String::new()),
            context_chars: 5,
            ..GenerationSettings::default()
        }
    }

    fn ctx(page: u32, text: &str) -> RankedCandidate {
        RankedCandidate {
            chunk_id: 1,
            document_id: 1,
            page,
            text: text.to_string(),
            raw_score: 1.0,
            normalized_score: 1.0,
            hybrid_score: 1.0,
            mode: SourceKind::Vector,
            embed_mode: None,
        }
    }

    #[test]
    fn url_and_model_order() {
        let g = ChatGenerator::new(&settings()).unwrap();
        assert_eq!(g.url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(g.models(), ["small", "large"]);
        assert!(g.api_key.is_none());
    }

    #[test]
    fn prompt_truncates_context() {
        let g = ChatGenerator::new(&settings()).unwrap();
        let prompt = g.prompt("Q?", &[ctx(3, "Alpha is first"), ctx(4, "Beta")]);
        assert_eq!(prompt, "Question: Q?\nContext:\n[p3] Alpha\n---\n[p4] Beta\n");
    }

    #[test]
    fn json_inside_prose_is_extracted() {
        let reply = parse_reply(
            "Sure:\n```json\n{\"answer\": \"Alpha is the first concept.\", \"answer_type\": \"factual\", \"sources\": [3, \"page:4\"]}\n```",
        );
        assert_eq!(reply.answer, "Alpha is the first concept.");
        assert_eq!(reply.answer_type, AnswerType::Factual);
        assert_eq!(reply.sources, Some(vec!["page:3".to_string(), "page:4".to_string()]));
    }

    #[test]
    fn answer_types_are_case_insensitive() {
        assert_eq!(parse_answer_type("Summarization"), AnswerType::Summarization);
        assert_eq!(parse_answer_type(" analytical "), AnswerType::Analytical);
        assert_eq!(parse_answer_type("out_of_scope"), AnswerType::OutOfScope);
        assert_eq!(parse_answer_type("opinion"), AnswerType::Contextual);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let reply = parse_reply(r#"{"answer": "It describes the plan."}"#);
        assert_eq!(reply.answer_type, AnswerType::Contextual);
        assert_eq!(reply.sources, None);
    }

    #[test]
    fn plain_text_replies() {
        let reply = parse_reply("  Alpha came first.  ");
        assert_eq!(reply.answer, "Alpha came first.");
        assert_eq!(reply.answer_type, AnswerType::Factual);
        assert_eq!(parse_reply("OUT_OF_SCOPE").answer_type, AnswerType::OutOfScope);
    }

    #[test]
    fn broken_json_is_out_of_scope() {
        for text in [r#"{"answer": "unterminated"#, r#"{"text": "no answer key"}"#, "} backwards {"] {
            let reply = parse_reply(text);
            assert_eq!(reply.answer, UNPARSEABLE_REPLY, "reply {text:?}");
            assert_eq!(reply.answer_type, AnswerType::OutOfScope);
        }
    }

    #[test]
    fn chat_response_shape_decodes() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"id":"c1","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"{}"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));
    }
}
