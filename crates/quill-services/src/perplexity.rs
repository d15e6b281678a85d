use async_trait::async_trait;
use chrono::Datelike;
use serde_json::json;

use crate::http::{read_json, transport_error, HttpSettings};
use crate::ResearchService;
use quill_types::{QuillError, ResearchDocument, Result};

const SERVICE: &str = "perplexity";

// ---------------------------------------------------------------------------
// PerplexityClient
// ---------------------------------------------------------------------------

/// Research service backed by Perplexity chat completions.
#[derive(Debug, Clone)]
pub struct PerplexityClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl PerplexityClient {
    pub fn new(api_key: String, model: String, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http.build_client()?,
            base_url: "https://api.perplexity.ai".to_string(),
            model,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, keyword: &str, year: i32) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "Be precise and concise." },
                {
                    "role": "user",
                    "content": format!(
                        "Find highly specific data about {keyword} in {year}. \
                         Give also the sources for the information."
                    )
                }
            ]
        })
    }
}

fn parse_response(body: &serde_json::Value) -> Result<ResearchDocument> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| QuillError::MalformedResponse {
            service: SERVICE.into(),
            message: "response has no message content".into(),
        })?;
    let citations = body["citations"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    Ok(ResearchDocument {
        content: content.to_string(),
        citations,
    })
}

#[async_trait]
impl ResearchService for PerplexityClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn query(&self, keyword: &str) -> Result<ResearchDocument> {
        let body = self.build_request_body(keyword, chrono::Utc::now().year());
        tracing::debug!(keyword, model = %self.model, "Requesting research");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let json = read_json(SERVICE, resp).await?;
        parse_response(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PerplexityClient {
        PerplexityClient::new("key".into(), "sonar".into(), &HttpSettings::default()).unwrap()
    }

    #[test]
    fn request_body_names_keyword_and_year() {
        let body = client().build_request_body("heat pumps", 2026);
        assert_eq!(body["model"], "sonar");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        let prompt = messages[1]["content"].as_str().unwrap();
        assert!(prompt.contains("heat pumps in 2026"));
    }

    #[test]
    fn parse_response_reads_content_and_citations() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Heat pumps grew 12%." } }],
            "citations": ["https://iea.example/report", 42]
        });
        let doc = parse_response(&body).unwrap();
        assert_eq!(doc.content, "Heat pumps grew 12%.");
        assert_eq!(doc.citations, vec!["https://iea.example/report".to_string()]);
    }

    #[test]
    fn parse_response_without_citations() {
        let body = json!({ "choices": [{ "message": { "content": "Facts." } }] });
        let doc = parse_response(&body).unwrap();
        assert!(doc.citations.is_empty());
    }

    #[test]
    fn parse_response_without_content_is_malformed() {
        let err = parse_response(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, QuillError::MalformedResponse { ref service, .. } if service == "perplexity"));
    }
}
