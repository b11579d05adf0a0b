//! Moderation endpoint client

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use tutor_agent_core::{Error, Result};

use crate::categories::ModerationCategory;

/// Outcome of one moderation check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub categories: BTreeSet<ModerationCategory>,
    /// Maximum per-category score across all thirteen categories, not just
    /// flagged ones, so dashboards see true moderation pressure.
    pub peak_score: f64,
}

/// Moderation boundary.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}

/// HTTP client for an OpenAI-compatible `/moderations` endpoint.
pub struct HttpModerationClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: HashMap<String, bool>,
    #[serde(default)]
    category_scores: HashMap<String, f64>,
}

impl HttpModerationClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModerationApi for HttpModerationClient {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let url = format!("{}/moderations", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Moderation(format!(
                "moderation endpoint returned {}",
                response.status()
            )));
        }

        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;
        let result = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Moderation("empty moderation result".to_string()))?;

        let mut categories = BTreeSet::new();
        for (key, hit) in &result.categories {
            if *hit {
                if let Some(category) = ModerationCategory::parse(key) {
                    categories.insert(category);
                }
            }
        }

        let peak_score = ModerationCategory::ALL
            .iter()
            .filter_map(|c| result.category_scores.get(c.as_str()).copied())
            .fold(0.0_f64, f64::max);

        Ok(ModerationVerdict {
            flagged: result.flagged,
            categories,
            peak_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parsing_includes_unflagged_scores() {
        let raw = serde_json::json!({
            "results": [{
                "flagged": true,
                "categories": { "harassment": true, "violence": false },
                "category_scores": { "harassment": 0.82, "violence": 0.91 }
            }]
        });
        let body: ModerationResponse = serde_json::from_value(raw).unwrap();
        let result = &body.results[0];

        let peak = ModerationCategory::ALL
            .iter()
            .filter_map(|c| result.category_scores.get(c.as_str()).copied())
            .fold(0.0_f64, f64::max);

        // Violence is unflagged but carries the highest score; the peak
        // must still reflect it.
        assert!((peak - 0.91).abs() < f64::EPSILON);
        assert!(result.flagged);
    }
}
