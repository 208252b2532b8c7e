//! Twitter/X service implementation
//!
//! Uses a bearer token read from a token file. The identity lookup at
//! authentication time doubles as a credential check; a 429 there records
//! the advertised reset time, and authentication attempts before that time
//! are skipped entirely rather than retried (the endpoint's rate budget is
//! tiny, so a retry would just burn the next window).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TwitterConfig;
use crate::error::{Result, ServiceError};
use crate::image::Image;
use crate::request::{GeoPoint, ReplyRef};
use crate::services::{Service, ServiceProfile};

pub struct TwitterService {
    client: Client,
    base_url: String,
    token_file: String,
    token: Option<String>,
    rate_limited_until: Option<DateTime<Utc>>,
    profile: ServiceProfile,
    live: bool,
}

impl TwitterService {
    pub fn new(config: &TwitterConfig, live: bool) -> Self {
        Self::with_base_url(
            "https://api.twitter.com".to_string(),
            config.token_file.clone(),
            live,
        )
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
            rate_limited_until: None,
            profile: ServiceProfile {
                max_text_len: 280,
                max_text_len_with_image: 255,
                ellipsis_reserve: 2,
                max_image_bytes: 5 * 1024 * 1024,
                max_image_pixels: None,
                max_image_count: 4,
            },
            live,
        }
    }

    fn load_token(&self) -> Result<String> {
        let path = shellexpand::tilde(&self.token_file).to_string();
        let token = std::fs::read_to_string(&path).map_err(|e| {
            ServiceError::Authentication(format!(
                "Twitter token file '{}' unreadable: {}",
                path, e
            ))
        })?;
        Ok(token.trim().to_string())
    }

    fn bearer(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            ServiceError::Authentication("Twitter session not established".to_string()).into()
        })
    }

    async fn upload_media(&self, image: &Image) -> Result<String> {
        let token = self.bearer()?.to_string();
        let mut part = multipart::Part::bytes(image.bytes().to_vec()).file_name("media");
        if let Some(mime) = image.mime() {
            part = part
                .mime_str(mime.as_str())
                .map_err(|e| ServiceError::Posting(format!("Invalid media type: {}", e)))?;
        }
        let mut form = multipart::Form::new().part("media", part);
        if let Some(description) = image.description() {
            form = form.text("alt_text", description.to_string());
        }

        let url = format!("{}/2/media/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Twitter media upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Posting(format!(
                "Twitter media upload failed ({}): {}",
                status, body
            ))
            .into());
        }

        let uploaded: MediaUploadResponse = response.json().await.map_err(|e| {
            ServiceError::Posting(format!("Twitter media response invalid: {}", e))
        })?;
        Ok(uploaded.data.id)
    }
}

fn reset_time(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[derive(Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geo: Option<GeoSettings>,
}

#[derive(Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Serialize)]
struct MediaSettings {
    media_ids: Vec<String>,
}

#[derive(Serialize)]
struct GeoSettings {
    coordinates: GeoJsonPoint,
}

#[derive(Serialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: &'static str,
    /// GeoJSON order: longitude first
    coordinates: [f64; 2],
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    data: MediaData,
}

#[derive(Deserialize)]
struct MediaData {
    id: String,
}

#[async_trait]
impl Service for TwitterService {
    fn name(&self) -> &'static str {
        "twitter"
    }

    fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    fn live(&self) -> bool {
        self.live
    }

    async fn authenticate(&mut self) -> Result<()> {
        if let Some(until) = self.rate_limited_until {
            if Utc::now() < until {
                warn!(
                    until = %until,
                    "Twitter identity endpoint still rate limited, skipping authentication"
                );
                return Ok(());
            }
        }

        let token = self.load_token()?;
        let url = format!("{}/2/users/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Twitter identity lookup failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            self.rate_limited_until = reset_time(&response);
            return Err(ServiceError::RateLimit(format!(
                "Twitter identity lookup throttled, reset at {}",
                self.rate_limited_until
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            ))
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Authentication(format!(
                "Twitter credentials rejected ({}): {}",
                status, body
            ))
            .into());
        }

        self.token = Some(token);
        info!("authenticated with Twitter");
        Ok(())
    }

    async fn submit(
        &self,
        text: &str,
        images: &[Image],
        geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<ReplyRef> {
        let in_reply_to = match reply_to {
            None => None,
            Some(ReplyRef::Status(id)) => Some(id.as_str()),
            Some(ReplyRef::Thread { .. }) => {
                return Err(ServiceError::Validation(
                    "Twitter replies need a tweet id, not a record ref".to_string(),
                )
                .into())
            }
        };

        let mut media_ids = Vec::with_capacity(images.len());
        for image in images {
            media_ids.push(self.upload_media(image).await?);
        }

        let request = CreateTweetRequest {
            text,
            reply: in_reply_to.map(|id| ReplySettings {
                in_reply_to_tweet_id: id,
            }),
            media: if media_ids.is_empty() {
                None
            } else {
                Some(MediaSettings { media_ids })
            },
            geo: geo.map(|g| GeoSettings {
                coordinates: GeoJsonPoint {
                    kind: "Point",
                    coordinates: [g.longitude, g.latitude],
                },
            }),
        };

        let token = self.bearer()?.to_string();
        let url = format!("{}/2/tweets", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Twitter post failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match status.as_u16() {
                401 | 403 => ServiceError::Authentication(format!(
                    "Twitter post rejected ({}): {}",
                    status, body
                )),
                429 => ServiceError::RateLimit(format!("Twitter post throttled: {}", body)),
                _ => ServiceError::Posting(format!("Twitter post failed ({}): {}", status, body)),
            };
            return Err(error.into());
        }

        let posted: CreateTweetResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Posting(format!("Twitter response invalid: {}", e)))?;
        Ok(ReplyRef::Status(posted.data.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bearer-token").unwrap();
        file
    }

    async fn authenticated_service(server: &MockServer) -> TwitterService {
        let file = token_file();
        let mut service = TwitterService::with_base_url(
            server.uri(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "99", "username": "tester" }
            })))
            .mount(server)
            .await;

        service.authenticate().await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_authenticate_rate_limit_skips_next_attempt() {
        let server = MockServer::start().await;
        let far_future = Utc::now().timestamp() + 900;

        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-rate-limit-reset", far_future.to_string().as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let file = token_file();
        let mut service = TwitterService::with_base_url(
            server.uri(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        let err = service.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("throttled"));

        // Second attempt before the reset: no network call (the mock's
        // expect(1) verifies this on drop), no error, still unauthenticated
        service.authenticate().await.unwrap();
        assert!(service.token.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let file = token_file();
        let mut service = TwitterService::with_base_url(
            server.uri(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        let err = service.authenticate().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_submit_creates_tweet_with_reply() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_json(serde_json::json!({
                "text": "hello birdsite",
                "reply": { "in_reply_to_tweet_id": "777" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "778" }
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let reply = ReplyRef::Status("777".to_string());

        let published = service
            .submit("hello birdsite", &[], None, Some(&reply))
            .await
            .unwrap();

        assert_eq!(published, ReplyRef::Status("778".to_string()));
    }

    #[tokio::test]
    async fn test_submit_passes_geo_through() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_partial_json(serde_json::json!({
                "geo": {
                    "coordinates": {
                        "type": "Point",
                        "coordinates": [-122.4, 37.7]
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "779" }
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let geo = GeoPoint {
            latitude: 37.7,
            longitude: -122.4,
        };

        let published = service.submit("located", &[], Some(geo), None).await.unwrap();
        assert_eq!(published, ReplyRef::Status("779".to_string()));
    }

    #[tokio::test]
    async fn test_submit_uploads_media_first() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/2/media/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "m-1" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_json(serde_json::json!({
                "text": "with picture",
                "media": { "media_ids": ["m-1"] }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "780" }
            })))
            .mount(&server)
            .await;

        let service = authenticated_service(&server).await;
        let image = Image::from_bytes(vec![0u8; 32]);

        let published = service
            .submit("with picture", &[image], None, None)
            .await
            .unwrap();
        assert_eq!(published, ReplyRef::Status("780".to_string()));
    }

    #[tokio::test]
    async fn test_submit_without_session_fails() {
        let file = token_file();
        let service = TwitterService::with_base_url(
            "http://localhost:1".to_string(),
            file.path().to_string_lossy().to_string(),
            true,
        );

        let err = service.submit("hi", &[], None, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
