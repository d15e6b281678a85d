use async_trait::async_trait;

use crate::http::{read_json, transport_error, HttpSettings};
use crate::MediaHost;
use quill_types::{MediaRef, Result};

const SERVICE: &str = "freeimage";

/// Media host backed by the freeimage.host upload API.
#[derive(Debug, Clone)]
pub struct FreeImageHost {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl FreeImageHost {
    pub fn new(api_key: String, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http.build_client()?,
            base_url: "https://freeimage.host".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

/// Upload name for an image generated for `name_hint`.
fn upload_name(name_hint: &str) -> String {
    let stem: String = name_hint
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{stem}_image.png")
}

fn parse_upload(body: &serde_json::Value) -> Option<MediaRef> {
    body["image"]["url"]
        .as_str()
        .filter(|url| !url.is_empty())
        .map(MediaRef::new)
}

#[async_trait]
impl MediaHost for FreeImageHost {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn upload(&self, bytes: Vec<u8>, name_hint: &str) -> Result<Option<MediaRef>> {
        let name = upload_name(name_hint);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str("image/png")
            .map_err(|e| transport_error(SERVICE, e))?;
        let form = reqwest::multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("action", "upload")
            .text("format", "json")
            .text("name", name)
            .part("source", part);

        let resp = self
            .client
            .post(format!("{}/api/1/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let json = read_json(SERVICE, resp).await?;
        let media = parse_upload(&json);
        if media.is_none() {
            tracing::warn!(name_hint, "Upload succeeded but no image URL was returned");
        }
        Ok(media)
    }
}
