//! Mastodon service implementation
//!
//! Talks to any Mastodon-compatible instance over its REST API. The posting
//! limits start from the standard defaults and are refreshed from the
//! instance's capability probe at authentication time, so non-default
//! instances (longer posts, bigger uploads) are honored automatically.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MastodonConfig;
use crate::error::{Result, ServiceError};
use crate::image::Image;
use crate::request::{GeoPoint, ReplyRef};
use crate::services::{Service, ServiceProfile};

pub struct MastodonService {
    client: Client,
    base_url: String,
    token_file: String,
    token: Option<String>,
    profile: ServiceProfile,
    live: bool,
}

fn default_profile() -> ServiceProfile {
    ServiceProfile {
        max_text_len: 500,
        max_text_len_with_image: 500,
        ellipsis_reserve: 1,
        max_image_bytes: 8 * 1024 * 1024,
        max_image_pixels: Some(16_777_216),
        max_image_count: 4,
    }
}

impl MastodonService {
    pub fn new(config: &MastodonConfig, live: bool) -> Self {
        let base_url = if config.instance.starts_with("http://")
            || config.instance.starts_with("https://")
        {
            config.instance.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.instance.trim_end_matches('/'))
        };
        Self::with_base_url(base_url, config.token_file.clone(), live)
    }

    pub fn with_base_url(base_url: String, token_file: String, live: bool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url,
            token_file,
            token: None,
            profile: default_profile(),
            live,
        }
    }

    fn load_token(&self) -> Result<String> {
        let path = shellexpand::tilde(&self.token_file).to_string();
        let token = std::fs::read_to_string(&path).map_err(|e| {
            ServiceError::Authentication(format!(
                "Mastodon token file '{}' unreadable: {}",
                path, e
            ))
        })?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(
                ServiceError::Authentication(format!("Mastodon token file '{}' is empty", path))
                    .into(),
            );
        }
        Ok(token)
    }

    fn bearer(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            ServiceError::Authentication("Mastodon session not established".to_string()).into()
        })
    }

    /// Fetch the instance's advertised limits and fold them into the profile
    async fn refresh_profile(&mut self) {
        let url = format!("{}/api/v1/instance", self.base_url);
        let info: InstanceInfo = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Mastodon instance probe returned invalid JSON: {}", e);
                    return;
                }
            },
            Ok(response) => {
                warn!(
                    status = %response.status(),
                    "Mastodon instance probe failed, keeping default limits"
                );
                return;
            }
            Err(e) => {
                warn!("Mastodon instance probe failed: {}", e);
                return;
            }
        };

        let Some(configuration) = info.configuration else {
            return;
        };
        if let Some(statuses) = configuration.statuses {
            if let Some(max_characters) = statuses.max_characters {
                self.profile.max_text_len = max_characters;
                self.profile.max_text_len_with_image = max_characters;
            }
            if let Some(max_media) = statuses.max_media_attachments {
                self.profile.max_image_count = max_media;
            }
        }
        if let Some(media) = configuration.media_attachments {
            if let Some(size_limit) = media.image_size_limit {
                self.profile.max_image_bytes = size_limit;
            }
            if let Some(matrix_limit) = media.image_matrix_limit {
                self.profile.max_image_pixels = Some(matrix_limit);
            }
        }
        debug!(
            max_text_len = self.profile.max_text_len,
            max_image_bytes = self.profile.max_image_bytes,
            "refreshed Mastodon limits from the instance"
        );
    }

    async fn upload_media(&self, image: &Image) -> Result<String> {
        let token = self.bearer()?.to_string();
        let mut part = multipart::Part::bytes(image.bytes().to_vec()).file_name("image");
        if let Some(mime) = image.mime() {
            part = part
                .mime_str(mime.as_str())
                .map_err(|e| ServiceError::Posting(format!("Invalid media type: {}", e)))?;
        }
        let mut form = multipart::Form::new().part("file", part);
        if let Some(description) = image.description() {
            form = form.text("description", description.to_string());
        }

        let url = format!("{}/api/v2/media", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Mastodon media upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(translate_status(status, "media upload", &body).into());
        }

        let media: MediaResponse = response.json().await.map_err(|e| {
            ServiceError::Posting(format!("Mastodon media response invalid: {}", e))
        })?;
        Ok(media.id)
    }
}

fn translate_status(status: reqwest::StatusCode, operation: &str, body: &str) -> ServiceError {
    match status.as_u16() {
        401 | 403 => ServiceError::Authentication(format!(
            "Mastodon {} rejected ({}): {}",
            operation, status, body
        )),
        422 => ServiceError::Validation(format!("Mastodon {} rejected: {}", operation, body)),
        429 => ServiceError::RateLimit(format!("Mastodon {} throttled: {}", operation, body)),
        _ => ServiceError::Posting(format!(
            "Mastodon {} failed ({}): {}",
            operation, status, body
        )),
    }
}

#[derive(Serialize)]
struct CreateStatusRequest<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct StatusResponse {
    id: String,
}

#[derive(Deserialize)]
struct MediaResponse {
    id: String,
}

#[derive(Deserialize)]
struct InstanceInfo {
    configuration: Option<InstanceConfiguration>,
}

#[derive(Deserialize)]
struct InstanceConfiguration {
    statuses: Option<StatusesConfiguration>,
    media_attachments: Option<MediaConfiguration>,
}

#[derive(Deserialize)]
struct StatusesConfiguration {
    max_characters: Option<usize>,
    max_media_attachments: Option<usize>,
}

#[derive(Deserialize)]
struct MediaConfiguration {
    image_size_limit: Option<usize>,
    image_matrix_limit: Option<u64>,
}

#[async_trait]
impl Service for MastodonService {
    fn name(&self) -> &'static str {
        "mastodon"
    }

    fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    fn live(&self) -> bool {
        self.live
    }

    async fn authenticate(&mut self) -> Result<()> {
        let token = self.load_token()?;

        let url = format!("{}/api/v1/accounts/verify_credentials", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| {
                ServiceError::Network(format!("Mastodon verify_credentials failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Authentication(format!(
                "Mastodon credentials rejected ({}): {}",
                status, body
            ))
            .into());
        }

        self.token = Some(token);
        self.refresh_profile().await;
        info!(instance = %self.base_url, "authenticated with Mastodon");
        Ok(())
    }

    async fn submit(
        &self,
        text: &str,
        images: &[Image],
        _geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<ReplyRef> {
        let in_reply_to_id = match reply_to {
            None => None,
            Some(ReplyRef::Status(id)) => Some(id.as_str()),
            Some(ReplyRef::Thread { .. }) => {
                return Err(ServiceError::Validation(
                    "Mastodon replies need a status id, not a record ref".to_string(),
                )
                .into())
            }
        };

        let mut media_ids = Vec::with_capacity(images.len());
        for image in images {
            media_ids.push(self.upload_media(image).await?);
        }

        let token = self.bearer()?.to_string();
        let url = format!("{}/api/v1/statuses", self.base_url);
        let request = CreateStatusRequest {
            status: text,
            media_ids,
            in_reply_to_id,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Mastodon post failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(translate_status(status, "post", &body).into());
        }

        let posted: StatusResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Posting(format!("Mastodon response invalid: {}", e)))?;
        Ok(ReplyRef::Status(posted.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_file(token: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}\n", token).unwrap();
        file
    }

    async fn authenticated_service(server: &MockServer) -> MastodonService {
        let file = token_file("test-token");
        let mut service = MastodonService::with_base_url(
            server.uri(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/verify_credentials"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1",
                "username": "tester"
            })))
            .mount(server)
            .await;

        service.authenticate().await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_profile_from_instance() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/instance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "configuration": {
                    "statuses": {
                        "max_characters": 5000,
                        "max_media_attachments": 6
                    },
                    "media_attachments": {
                        "image_size_limit": 16_000_000,
                        "image_matrix_limit": 33_177_600u64
                    }
                }
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;

        assert_eq!(service.profile().max_text_len, 5000);
        assert_eq!(service.profile().max_image_count, 6);
        assert_eq!(service.profile().max_image_bytes, 16_000_000);
        assert_eq!(service.profile().max_image_pixels, Some(33_177_600));
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_default_profile() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/instance"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;

        assert_eq!(service.profile(), &default_profile());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/verify_credentials"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let file = token_file("bad-token");
        let mut service = MastodonService::with_base_url(
            server.uri(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        let err = service.authenticate().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_submit_posts_status_with_reply() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/instance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(body_json(serde_json::json!({
                "status": "hello fediverse",
                "in_reply_to_id": "108"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "109"
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let reply = ReplyRef::Status("108".to_string());

        let published = service
            .submit("hello fediverse", &[], None, Some(&reply))
            .await
            .unwrap();

        assert_eq!(published, ReplyRef::Status("109".to_string()));
    }

    #[tokio::test]
    async fn test_submit_uploads_media_first() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/instance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v2/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "55"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(body_json(serde_json::json!({
                "status": "with picture",
                "media_ids": ["55"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "110"
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let image = Image::from_bytes(vec![0u8; 32]);

        let published = service
            .submit("with picture", &[image], None, None)
            .await
            .unwrap();

        assert_eq!(published, ReplyRef::Status("110".to_string()));
    }

    #[tokio::test]
    async fn test_submit_rejects_thread_reply_ref() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/instance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let reply = ReplyRef::Thread {
            root: crate::request::RecordRef {
                uri: "at://x/1".to_string(),
                cid: "c1".to_string(),
            },
            parent: crate::request::RecordRef {
                uri: "at://x/2".to_string(),
                cid: "c2".to_string(),
            },
        };

        let err = service.submit("hi", &[], None, Some(&reply)).await.unwrap_err();
        assert!(err.to_string().contains("status id"));
    }
}
