//! Image hosting.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image host rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("image host is not configured")]
    NotConfigured,

    #[error("empty image")]
    Empty,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Stores `bytes` under `name` and returns the reference used from then on.
    async fn upload(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ImageHostError>;
}

/// Unsigned uploads through a Cloudinary upload preset.
#[derive(Clone, Debug)]
pub struct CloudinaryHost {
    client: Client,
    api_base: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Result<Self, ImageHostError> {
        Self::with_base(DEFAULT_CLOUDINARY_API_BASE, cloud_name, upload_preset)
    }

    pub fn with_base(api_base: impl Into<String>, cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Result<Self, ImageHostError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        })
    }
}

/// `data:` URI accepted by the upload endpoint in place of a multipart file.
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}

/// Public id derived from a file name: extension dropped, unsafe characters replaced.
pub fn public_id(name: &str) -> String {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct UploadErrorBody {
    error: UploadErrorDetail,
}

#[derive(Deserialize)]
struct UploadErrorDetail {
    message: String,
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ImageHostError> {
        if bytes.is_empty() { return Err(ImageHostError::Empty); }
        let form = [
            ("file", data_uri(content_type, &bytes)),
            ("upload_preset", self.upload_preset.clone()),
            ("public_id", public_id(name)),
        ];
        let response = self.client
            .post(format!("{}/v1_1/{}/image/upload", self.api_base, self.cloud_name))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.json::<UploadErrorBody>().await.map(|b| b.error.message).unwrap_or_default();
            return Err(ImageHostError::Rejected { status: status.as_u16(), message });
        }
        Ok(response.json::<UploadResponse>().await?.secure_url)
    }
}

/// Stand-in when no image host is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredImageHost;

#[async_trait]
impl ImageHost for UnconfiguredImageHost {
    async fn upload(&self, _name: &str, _content_type: &str, _bytes: Vec<u8>) -> Result<String, ImageHostError> {
        Err(ImageHostError::NotConfigured)
    }
}
