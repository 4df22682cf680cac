use super::{CollaboratorError, SearchHit, SearchService};
use crate::config::settings::read_api_key;
use crate::config::SearchSettings;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "search";

/// Tavily-compatible web search client.
#[derive(Debug, Clone)]
pub struct HttpSearch {
    endpoint: String,
    api_key_env: String,
    api_key: Option<String>,
    search_depth: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl HttpSearch {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key: read_api_key(&settings.api_key_env),
            search_depth: settings.search_depth.clone(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build(),
        }
    }
}

impl SearchService for HttpSearch {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, CollaboratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollaboratorError::NotConfigured {
                service: SERVICE,
                reason: format!("environment variable `{}` is not set", self.api_key_env),
            })?;

        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(json!({
                "api_key": api_key,
                "query": query,
                "max_results": max_results,
                "search_depth": self.search_depth,
            }))
            .map_err(|e| CollaboratorError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let parsed: SearchResponse =
            response
                .into_json()
                .map_err(|e| CollaboratorError::Response {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;
        let mut hits = parsed.results;
        hits.truncate(max_results);
        Ok(hits)
    }
}
