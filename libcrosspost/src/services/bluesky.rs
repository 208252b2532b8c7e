//! Bluesky (AT Protocol) service implementation
//!
//! Posts are records in the user's repository. Replies carry a strong-ref
//! pair (thread root plus immediate parent), so this service hands back
//! [`ReplyRef::Thread`] handles; the shared chaining logic keeps the root
//! stable while the parent advances through a thread.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::BlueskyConfig;
use crate::error::{Result, ServiceError};
use crate::image::Image;
use crate::request::{GeoPoint, RecordRef, ReplyRef};
use crate::services::{Service, ServiceProfile};

pub struct BlueskyService {
    client: Client,
    base_url: String,
    identifier: String,
    password_file: String,
    session: Option<Session>,
    profile: ServiceProfile,
    live: bool,
}

struct Session {
    access_jwt: String,
    did: String,
}

impl BlueskyService {
    pub fn new(config: &BlueskyConfig, live: bool) -> Self {
        Self::with_base_url(
            config.service.trim_end_matches('/').to_string(),
            config.identifier.clone(),
            config.password_file.clone(),
            live,
        )
    }

    pub fn with_base_url(
        base_url: String,
        identifier: String,
        password_file: String,
        live: bool,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url,
            identifier,
            password_file,
            session: None,
            profile: ServiceProfile {
                max_text_len: 300,
                max_text_len_with_image: 300,
                ellipsis_reserve: 1,
                max_image_bytes: 1_000_000,
                max_image_pixels: None,
                max_image_count: 4,
            },
            live,
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            ServiceError::Authentication("Bluesky session not established".to_string()).into()
        })
    }

    fn load_password(&self) -> Result<String> {
        let path = shellexpand::tilde(&self.password_file).to_string();
        let password = std::fs::read_to_string(&path).map_err(|e| {
            ServiceError::Authentication(format!(
                "Bluesky password file '{}' unreadable: {}",
                path, e
            ))
        })?;
        Ok(password.trim().to_string())
    }

    async fn upload_blob(&self, image: &Image) -> Result<serde_json::Value> {
        let session = self.session()?;
        let url = format!("{}/xrpc/com.atproto.repo.uploadBlob", self.base_url);
        let content_type = image
            .mime()
            .map(|m| m.as_str())
            .unwrap_or("application/octet-stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .header("Content-Type", content_type)
            .body(image.bytes().to_vec())
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Bluesky blob upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Posting(format!(
                "Bluesky blob upload failed ({}): {}",
                status, body
            ))
            .into());
        }

        let uploaded: BlobResponse = response.json().await.map_err(|e| {
            ServiceError::Posting(format!("Bluesky blob response invalid: {}", e))
        })?;
        Ok(uploaded.blob)
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct BlobResponse {
    blob: serde_json::Value,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: String,
}

#[async_trait]
impl Service for BlueskyService {
    fn name(&self) -> &'static str {
        "bluesky"
    }

    fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    fn live(&self) -> bool {
        self.live
    }

    async fn authenticate(&mut self) -> Result<()> {
        let password = self.load_password()?;
        let url = format!("{}/xrpc/com.atproto.server.createSession", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "identifier": self.identifier,
                "password": password,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Bluesky session failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Authentication(format!(
                "Bluesky credentials rejected ({}): {}",
                status, body
            ))
            .into());
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            ServiceError::Authentication(format!("Bluesky session response invalid: {}", e))
        })?;
        info!(did = %session.did, "authenticated with Bluesky");
        self.session = Some(Session {
            access_jwt: session.access_jwt,
            did: session.did,
        });
        Ok(())
    }

    async fn submit(
        &self,
        text: &str,
        images: &[Image],
        _geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<ReplyRef> {
        let session = self.session()?;

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        match reply_to {
            None => {}
            Some(ReplyRef::Thread { root, parent }) => {
                record["reply"] = json!({
                    "root": { "uri": root.uri, "cid": root.cid },
                    "parent": { "uri": parent.uri, "cid": parent.cid },
                });
            }
            Some(ReplyRef::Status(_)) => {
                return Err(ServiceError::Validation(
                    "Bluesky replies need a record ref, not a status id".to_string(),
                )
                .into())
            }
        }

        if !images.is_empty() {
            let mut embedded = Vec::with_capacity(images.len());
            for image in images {
                let blob = self.upload_blob(image).await?;
                embedded.push(json!({
                    "image": blob,
                    "alt": image.description().unwrap_or(""),
                }));
            }
            record["embed"] = json!({
                "$type": "app.bsky.embed.images",
                "images": embedded,
            });
        }

        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("Bluesky post failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match status.as_u16() {
                401 | 403 => ServiceError::Authentication(format!(
                    "Bluesky post rejected ({}): {}",
                    status, body
                )),
                429 => ServiceError::RateLimit(format!("Bluesky post throttled: {}", body)),
                _ => ServiceError::Posting(format!("Bluesky post failed ({}): {}", status, body)),
            };
            return Err(error.into());
        }

        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Posting(format!("Bluesky response invalid: {}", e)))?;

        let record_ref = RecordRef {
            uri: created.uri,
            cid: created.cid,
        };
        Ok(ReplyRef::Thread {
            root: record_ref.clone(),
            parent: record_ref,
        })
    }
}
