use super::{CollaboratorError, Prompt, ReasoningService};
use crate::config::settings::read_api_key;
use crate::config::ReasoningSettings;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "reasoning";

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct HttpReasoning {
    endpoint: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
    temperature: f32,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpReasoning {
    pub fn from_settings(settings: &ReasoningSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key: read_api_key(&settings.api_key_env),
            temperature: settings.temperature,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build(),
        }
    }
}

impl ReasoningService for HttpReasoning {
    fn invoke(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollaboratorError::NotConfigured {
                service: SERVICE,
                reason: format!("environment variable `{}` is not set", self.api_key_env),
            })?;

        let body = json!({
            "model": self.model,
            "temperature": prompt.temperature.unwrap_or(self.temperature),
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body)
            .map_err(|e| CollaboratorError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let completion: ChatCompletion =
            response
                .into_json()
                .map_err(|e| CollaboratorError::Response {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CollaboratorError::Response {
                service: SERVICE,
                reason: "completion has no message content".to_string(),
            })
    }
}
