//! Cloudinary unsigned uploads and delivery-URL transformations.

use async_trait::async_trait;
use comic_platform::{MediaFile, MediaHost, PlatformError, UploadedMedia};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

pub const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";
pub const CLOUDINARY_DELIVERY_BASE: &str = "https://res.cloudinary.com";

const UPLOAD_SEGMENT: &str = "/image/upload/";

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
}

#[derive(Deserialize)]
struct UploadErrorBody {
    error: UploadErrorDetail,
}

#[derive(Deserialize)]
struct UploadErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryMediaHost {
    http: reqwest::Client,
    api_base: String,
    delivery_base: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryMediaHost {
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("comic-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PlatformError::Backend(err.to_string()))?;
        Ok(Self {
            http,
            api_base: CLOUDINARY_API_BASE.to_owned(),
            delivery_base: CLOUDINARY_DELIVERY_BASE.to_owned(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        })
    }

    /// Point uploads at another API base, e.g. a local test server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", self.api_base, self.cloud_name)
    }
}

fn transformation(width: u32, height: u32) -> String {
    format!("c_fill,w_{width},h_{height},q_auto,f_auto")
}

#[async_trait]
impl MediaHost for CloudinaryMediaHost {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, PlatformError> {
        if self.cloud_name.is_empty() || self.upload_preset.is_empty() {
            return Err(PlatformError::Backend(
                "media host is not configured (cloud name and upload preset required)".to_owned(),
            ));
        }

        let size = file.bytes.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|err| PlatformError::Backend(err.to_string()))?;
        let form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part("file", part);

        debug!(cloud = %self.cloud_name, size, "uploading cover image");
        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|err| PlatformError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UploadErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            return Err(PlatformError::Rejected {
                code: status.as_u16(),
                message,
            });
        }

        let uploaded = response
            .json::<UploadResponse>()
            .await
            .map_err(|err| PlatformError::Backend(format!("undecodable upload response: {err}")))?;
        Ok(UploadedMedia {
            reference: uploaded.public_id,
        })
    }

    fn derive_url(&self, reference: &str, width: u32, height: u32) -> String {
        let transformation = transformation(width, height);
        if reference.starts_with("http://") || reference.starts_with("https://") {
            // Full delivery URLs stored by older clients get the transformation spliced in.
            return match reference.split_once(UPLOAD_SEGMENT) {
                Some((head, tail)) => format!("{head}{UPLOAD_SEGMENT}{transformation}/{tail}"),
                None => reference.to_owned(),
            };
        }

        format!(
            "{}/{}{UPLOAD_SEGMENT}{transformation}/{}",
            self.delivery_base,
            self.cloud_name,
            reference.trim_start_matches('/')
        )
    }
}
