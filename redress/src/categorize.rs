//! Advisory categorization of new grievances
//!
//! A [`Categorizer`] suggests a category and department for a filing that
//! left them blank. Suggestions are never trusted as-is: the service runs
//! them through [`RuleSet::validate_suggestion`](crate::rules::RuleSet::validate_suggestion)
//! before they route anything, and the rule's SLA always wins over a
//! suggested one.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grievance::NewGrievance;
use crate::rules::RuleSet;

/// Error type for categorizer operations
#[derive(Debug, thiserror::Error)]
pub enum CategorizeError {
    #[error("Categorizer request failed: {0}")]
    RequestFailed(String),

    #[error("Categorizer response parse error: {0}")]
    ParseError(String),

    #[error("Categorizer unavailable: {0}")]
    Unavailable(String),
}

/// A suggested routing for a new grievance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    pub category: String,
    pub department_id: String,
    #[serde(default)]
    pub authority_id: Option<String>,
    #[serde(default)]
    pub sla_days: Option<u32>,
    #[serde(default)]
    pub confidence: f64,
}

/// Categorization collaborator
#[async_trait]
pub trait Categorizer: Send + Sync {
    async fn suggest(&self, filing: &NewGrievance) -> Result<CategorySuggestion, CategorizeError>;
}

/// Endpoint settings for [`HttpCategorizer`]
#[derive(Debug, Clone)]
pub struct CategorizerConfig {
    /// OpenAI-compatible chat completions URL
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "default".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CategorizerConfig {
    /// Defaults overridden by `REDRESS_CATEGORIZER_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDRESS_CATEGORIZER_URL") {
            config.endpoint = url;
        }
        if let Ok(model) = std::env::var("REDRESS_CATEGORIZER_MODEL") {
            config.model = model;
        }
        if let Ok(key) = std::env::var("REDRESS_CATEGORIZER_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(secs) = std::env::var("REDRESS_CATEGORIZER_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout = Duration::from_secs(secs);
            }
        }
        config
    }
}

/// Categorizer backed by a chat completions endpoint
pub struct HttpCategorizer {
    config: CategorizerConfig,
    /// Known (category, department) pairs offered to the model
    catalog: Vec<(String, String)>,
    client: reqwest::Client,
}

impl HttpCategorizer {
    pub fn new(config: CategorizerConfig, rules: &RuleSet) -> Result<Self, CategorizeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CategorizeError::Unavailable(e.to_string()))?;
        let mut catalog: Vec<(String, String)> = rules
            .iter()
            .map(|rule| (rule.category.clone(), rule.department_id.clone()))
            .collect();
        catalog.sort();
        Ok(Self {
            config,
            catalog,
            client,
        })
    }

    fn prompt(&self, filing: &NewGrievance) -> String {
        let catalog = self
            .catalog
            .iter()
            .map(|(category, department)| format!("- {} / {}", category, department))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "## Known categories (category / department)\n\n{}\n\n## Subject\n\n{}\n\n## Description\n\n{}",
            catalog, filing.subject, filing.description
        )
    }
}

const SYSTEM_PROMPT: &str = r#"You route citizen grievances to the responsible department.
Pick exactly one category/department pair from the list you are given.
Answer with a single JSON object and nothing else:
{"category": "...", "department_id": "...", "authority_id": null, "confidence": 0.0}"#;

#[async_trait]
impl Categorizer for HttpCategorizer {
    async fn suggest(&self, filing: &NewGrievance) -> Result<CategorySuggestion, CategorizeError> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": self.prompt(filing)}
            ],
            "max_tokens": 256,
            "temperature": 0.0
        });

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CategorizeError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CategorizeError::RequestFailed(format!(
                "categorizer error ({}): {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CategorizeError::ParseError(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CategorizeError::ParseError("response has no content".to_string()))?;

        let suggestion = parse_suggestion(content)?;
        debug!(
            category = %suggestion.category,
            department = %suggestion.department_id,
            confidence = suggestion.confidence,
            "Categorizer suggestion"
        );
        Ok(suggestion)
    }
}

/// Parse a suggestion from model output, tolerating code fences and prose
/// around the JSON object.
pub fn parse_suggestion(content: &str) -> Result<CategorySuggestion, CategorizeError> {
    let start = content
        .find('{')
        .ok_or_else(|| CategorizeError::ParseError("no JSON object in response".to_string()))?;
    let end = content
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| CategorizeError::ParseError("unterminated JSON object".to_string()))?;

    let suggestion: CategorySuggestion = serde_json::from_str(&content[start..=end])
        .map_err(|e| CategorizeError::ParseError(e.to_string()))?;

    if suggestion.category.trim().is_empty() || suggestion.department_id.trim().is_empty() {
        return Err(CategorizeError::ParseError(
            "suggestion is missing category or department".to_string(),
        ));
    }
    Ok(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let s = parse_suggestion(
            r#"{"category": "Utilities", "department_id": "DPT-UTIL", "confidence": 0.8}"#,
        )
        .unwrap();
        assert_eq!(s.category, "Utilities");
        assert_eq!(s.department_id, "DPT-UTIL");
        assert_eq!(s.authority_id, None);
        assert_eq!(s.sla_days, None);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "Here you go:\n```json\n{\"category\": \"Roads\", \"department_id\": \"DPT-PWD\", \"authority_id\": \"PWD-WARD\"}\n```";
        let s = parse_suggestion(content).unwrap();
        assert_eq!(s.authority_id.as_deref(), Some("PWD-WARD"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_suggestion("no idea").is_err());
        assert!(parse_suggestion(r#"{"category": "", "department_id": "X"}"#).is_err());
        assert!(parse_suggestion("} backwards {").is_err());
    }
}
