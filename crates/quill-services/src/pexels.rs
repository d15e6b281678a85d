use async_trait::async_trait;

use crate::http::{read_json, transport_error, HttpSettings};
use crate::PhotoSearch;
use quill_types::Result;

const SERVICE: &str = "pexels";

/// Stock photo search backed by the Pexels API.
#[derive(Debug, Clone)]
pub struct PexelsClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    per_page: u32,
}

impl PexelsClient {
    pub fn new(api_key: String, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http.build_client()?,
            base_url: "https://api.pexels.com".to_string(),
            per_page: 10,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

fn parse_photo_urls(body: &serde_json::Value) -> Vec<String> {
    body["photos"]
        .as_array()
        .map(|photos| {
            photos
                .iter()
                .filter_map(|p| p["url"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PhotoSearch for PexelsClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let per_page = self.per_page.to_string();
        let resp = self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let json = read_json(SERVICE, resp).await?;
        Ok(parse_photo_urls(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_photo_urls_collects_page_urls() {
        let body = json!({
            "page": 1,
            "per_page": 10,
            "photos": [
                { "id": 1, "url": "https://www.pexels.com/photo/one-1/" },
                { "id": 2 },
                { "id": 3, "url": "https://www.pexels.com/photo/three-3/" }
            ]
        });
        assert_eq!(
            parse_photo_urls(&body),
            vec![
                "https://www.pexels.com/photo/one-1/".to_string(),
                "https://www.pexels.com/photo/three-3/".to_string()
            ]
        );
    }

    #[test]
    fn parse_photo_urls_empty_body() {
        assert!(parse_photo_urls(&json!({})).is_empty());
    }
}
