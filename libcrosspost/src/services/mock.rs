//! Mock service implementation for testing
//!
//! A configurable service that records every submission it receives, so
//! tests can verify wrapping, reply chaining and fan-out behavior without
//! credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{Result, ServiceError};
use crate::image::Image;
use crate::request::{GeoPoint, RecordRef, ReplyRef};
use crate::services::{Service, ServiceProfile};

/// One call to `submit`, as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub text: String,
    pub image_count: usize,
    pub geo: Option<GeoPoint>,
    pub reply_to: Option<ReplyRef>,
}

/// Configuration for mock service behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Service name (e.g. "mock-mastodon")
    pub name: &'static str,

    /// Whether authentication should succeed
    pub auth_succeeds: bool,

    /// Whether submission should succeed
    pub submit_succeeds: bool,

    /// Error message for authentication failure
    pub auth_error: Option<String>,

    /// Error message for submission failure
    pub submit_error: Option<String>,

    /// Whether the service is live (submits reach the "network")
    pub live: bool,

    /// Return record-ref thread handles instead of flat status ids
    pub thread_refs: bool,

    /// Posting limits
    pub profile: ServiceProfile,

    /// Number of times authenticate has been called
    pub auth_call_count: Arc<Mutex<usize>>,

    /// Every submission made, in order
    pub submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock",
            auth_succeeds: true,
            submit_succeeds: true,
            auth_error: None,
            submit_error: None,
            live: true,
            thread_refs: false,
            profile: ServiceProfile {
                max_text_len: 500,
                max_text_len_with_image: 500,
                ellipsis_reserve: 1,
                max_image_bytes: 8 * 1024 * 1024,
                max_image_pixels: None,
                max_image_count: 4,
            },
            auth_call_count: Arc::new(Mutex::new(0)),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock service for testing
pub struct MockService {
    config: MockConfig,
    authenticated: bool,
}

impl MockService {
    /// Create a new mock service with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Create a mock service that always succeeds
    pub fn success(name: &'static str) -> Self {
        Self::new(MockConfig {
            name,
            ..Default::default()
        })
    }

    /// Create a mock service that fails authentication
    pub fn auth_failure(name: &'static str, error: &str) -> Self {
        Self::new(MockConfig {
            name,
            auth_succeeds: false,
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock service that fails submission
    pub fn submit_failure(name: &'static str, error: &str) -> Self {
        Self::new(MockConfig {
            name,
            submit_succeeds: false,
            submit_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock service with specific posting limits
    pub fn with_profile(name: &'static str, profile: ServiceProfile) -> Self {
        Self::new(MockConfig {
            name,
            profile,
            ..Default::default()
        })
    }

    /// Create a mock service that is not live (dev mode)
    pub fn offline(name: &'static str) -> Self {
        Self::new(MockConfig {
            name,
            live: false,
            ..Default::default()
        })
    }

    /// Create a mock service that hands out record-ref thread handles
    pub fn with_thread_refs(name: &'static str) -> Self {
        Self::new(MockConfig {
            name,
            thread_refs: true,
            ..Default::default()
        })
    }

    /// Get the number of times authenticate was called
    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    /// Get every submission made, in order
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.config.submissions.lock().unwrap().clone()
    }

    /// Shared handles for inspecting the mock after it has been boxed
    pub fn config(&self) -> MockConfig {
        self.config.clone()
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &'static str {
        self.config.name
    }

    fn profile(&self) -> &ServiceProfile {
        &self.config.profile
    }

    fn live(&self) -> bool {
        self.config.live
    }

    async fn authenticate(&mut self) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;

        if self.config.auth_succeeds {
            self.authenticated = true;
            Ok(())
        } else {
            let message = self
                .config
                .auth_error
                .clone()
                .unwrap_or_else(|| "Mock authentication failed".to_string());
            Err(ServiceError::Authentication(message).into())
        }
    }

    async fn submit(
        &self,
        text: &str,
        images: &[Image],
        geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<ReplyRef> {
        if !self.config.submit_succeeds {
            let message = self
                .config
                .submit_error
                .clone()
                .unwrap_or_else(|| "Mock submission failed".to_string());
            return Err(ServiceError::Posting(message).into());
        }

        let mut submissions = self.config.submissions.lock().unwrap();
        submissions.push(RecordedSubmission {
            text: text.to_string(),
            image_count: images.len(),
            geo,
            reply_to: reply_to.cloned(),
        });
        let n = submissions.len();

        if self.config.thread_refs {
            let record = RecordRef {
                uri: format!("at://{}/post/{}", self.config.name, n),
                cid: format!("cid-{}-{}", self.config.name, n),
            };
            Ok(ReplyRef::Thread {
                root: record.clone(),
                parent: record,
            })
        } else {
            Ok(ReplyRef::Status(format!("{}:{}", self.config.name, n)))
        }
    }
}
