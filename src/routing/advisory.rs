// src/routing/advisory.rs
//
// Advisory routing strategy backed by an OpenAI-compatible chat completions
// endpoint.
//
// The request carries the live context and the verbatim catalog. Each reply
// is run through `validate_payload`; a rejected reply is answered with a
// correction message and re-issued, up to `max_retries` extra attempts.
// Transport failures and exhausted retries fall through to the deterministic
// strategy. Nothing here returns an error to the engine.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AdvisoryConfig;

use super::fallback::FallbackStrategy;
use super::{validate_payload, RoutingContext, RoutingDecision, RoutingStrategy};

const SYSTEM_PROMPT: &str = "\
You are a crowd safety routing advisor for Lumen Field in Seattle during major events.

Given live egress threat data, game state and corridor traffic loads:
1. Select DANGEROUS routes (overwhelmed, high crush risk) as danger_routes
2. Select SAFE routes (recommended alternatives) as safe_routes
3. Write a concise alert_message (1-2 sentences) for transit operators
4. Set severity 1-5 (5 = critical)

Return route objects ONLY from the available routes list, copied exactly \
(id, label, corridor, path). A route cannot be both dangerous and safe.

Reply with one JSON object with keys danger_routes, safe_routes, alert_message, severity.";

const USER_PROMPT: &str = "Analyze the current egress situation and provide routing.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory client setup failed: {0}")]
    Setup(String),

    #[error("advisory request failed: {0}")]
    Transport(String),

    #[error("advisory service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("advisory response had no content")]
    EmptyResponse,
}

/// One chat round-trip returning the assistant's raw content.
pub trait AdvisoryClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, AdvisoryError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking HTTP client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpAdvisoryClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpAdvisoryClient {
    pub fn new(cfg: &AdvisoryConfig) -> Result<Self, AdvisoryError> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdvisoryError::Setup("missing api key".to_string()))?;
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| AdvisoryError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
        })
    }
}

impl AdvisoryClient for HttpAdvisoryClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, AdvisoryError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat { kind: "json_object" },
            temperature: 0.0,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| AdvisoryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: CompletionResponse = resp
            .json()
            .map_err(|e| AdvisoryError::Transport(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AdvisoryError::EmptyResponse)
    }
}

/// Live context block appended after the static system prompt.
pub fn live_context(ctx: &RoutingContext<'_>) -> String {
    let mut parts = vec![
        format!("Egress threat score: {:.2} (0-1)", ctx.threat_score),
        format!("Estimated crowd volume: {}", ctx.crowd_volume),
    ];
    if ctx.game_state.is_active() {
        parts.push(format!("Game: {}", ctx.game_state.summary()));
    }
    if !ctx.transit_loads.is_empty() {
        parts.push(format!(
            "Corridor transit loads: {}",
            serde_json::to_string(&ctx.transit_loads).unwrap_or_default()
        ));
    }
    if !ctx.pedestrian_volume.is_empty() {
        parts.push(format!(
            "Corridor pedestrian volume: {}",
            serde_json::to_string(&ctx.pedestrian_volume).unwrap_or_default()
        ));
    }
    parts.push(String::new());
    parts.push("Available routes (select from these ONLY):".to_string());
    for r in ctx.catalog.routes() {
        parts.push(format!("  - {}", serde_json::to_string(r).unwrap_or_default()));
    }
    parts.join("\n")
}

pub struct AdvisoryStrategy<C: AdvisoryClient> {
    client: C,
    fallback: FallbackStrategy,
    max_retries: u32,
}

impl<C: AdvisoryClient> AdvisoryStrategy<C> {
    pub fn new(client: C, fallback: FallbackStrategy, max_retries: u32) -> Self {
        Self { client, fallback, max_retries }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: AdvisoryClient> RoutingStrategy for AdvisoryStrategy<C> {
    fn name(&self) -> &'static str {
        "advisory"
    }

    fn decide(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::system(live_context(ctx)),
            ChatMessage::user(USER_PROMPT),
        ];

        for attempt in 0..=self.max_retries {
            let content = match self.client.complete(&messages) {
                Ok(c) => c,
                Err(e) => {
                    warn!(attempt, error = %e, "advisory call failed; using fallback routing");
                    return self.fallback.decide(ctx);
                }
            };
            match validate_payload(&content, ctx.catalog) {
                Ok(decision) => {
                    debug!(attempt, severity = decision.severity.level(), "advisory decision accepted");
                    return decision;
                }
                Err(reason) => {
                    warn!(attempt, reason = %reason, "advisory decision rejected");
                    messages.push(ChatMessage::assistant(content));
                    messages.push(ChatMessage::user(reason.correction_message()));
                }
            }
        }

        warn!(
            attempts = self.max_retries + 1,
            "advisory retries exhausted; using fallback routing"
        );
        self.fallback.decide(ctx)
    }
}
